// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Per-request dependency injection for handlers. A resource is built at
//! most once per request by its registered factory, which may itself
//! depend on other resources.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::Future as StdFuture;
use std::pin::Pin;
use std::rc::Rc;

use crate::fail::Fail;

type BoxFuture<'a, T> = Pin<Box<dyn StdFuture<Output = T> + 'a>>;

/// A registered constructor for a resource type, receiving the same
/// context it was looked up from so it can request its own dependencies.
pub trait ResourceFactory {
    fn build<'a>(&'a self, ctx: &'a ResourceContext) -> BoxFuture<'a, Result<Rc<dyn Any>, Fail>>;
}

impl<F> ResourceFactory for F
where
    F: for<'a> Fn(&'a ResourceContext) -> BoxFuture<'a, Result<Rc<dyn Any>, Fail>>,
{
    fn build<'a>(&'a self, ctx: &'a ResourceContext) -> BoxFuture<'a, Result<Rc<dyn Any>, Fail>> {
        self(ctx)
    }
}

/// Per-request resource cache and cycle guard. One is constructed per
/// accepted connection's current request and handed to the handler.
pub struct ResourceContext {
    factories: Rc<HashMap<TypeId, Box<dyn ResourceFactory>>>,
    built: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    being_built: RefCell<HashSet<TypeId>>,
}

impl ResourceContext {
    pub fn new(factories: Rc<HashMap<TypeId, Box<dyn ResourceFactory>>>) -> Self {
        ResourceContext { factories, built: RefCell::new(HashMap::new()), being_built: RefCell::new(HashSet::new()) }
    }

    /// Looks up (or lazily builds and memoizes) the resource of type `T`.
    /// Fails with `Fail::FailedPrecondition` on a dependency cycle, or
    /// `Fail::NotFound` if no factory was registered for `T`.
    pub async fn get<T: 'static>(&self) -> Result<Rc<T>, Fail> {
        let type_id = TypeId::of::<T>();

        if let Some(existing) = self.built.borrow().get(&type_id) {
            return downcast(existing.clone());
        }

        if !self.being_built.borrow_mut().insert(type_id) {
            return Err(Fail::FailedPrecondition {
                message: "cyclic resource dependency detected".into(),
            });
        }

        let factory = self.factories.get(&type_id).ok_or_else(|| {
            self.being_built.borrow_mut().remove(&type_id);
            Fail::not_found("no resource factory registered for this type")
        });
        let factory = match factory {
            Ok(factory) => factory,
            Err(err) => return Err(err),
        };

        let result = factory.build(self).await;
        self.being_built.borrow_mut().remove(&type_id);
        let built = result?;
        self.built.borrow_mut().insert(type_id, built.clone());
        downcast(built)
    }
}

fn downcast<T: 'static>(value: Rc<dyn Any>) -> Result<Rc<T>, Fail> {
    value
        .downcast::<T>()
        .map_err(|_| Fail::internal("resource factory returned the wrong concrete type"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    struct Greeting(String);
    struct Shout(String);

    fn factories() -> Rc<HashMap<TypeId, Box<dyn ResourceFactory>>> {
        let mut map: HashMap<TypeId, Box<dyn ResourceFactory>> = HashMap::new();
        map.insert(
            TypeId::of::<Greeting>(),
            Box::new(|_ctx: &ResourceContext| -> BoxFuture<'_, Result<Rc<dyn Any>, Fail>> {
                Box::pin(async { Ok(Rc::new(Greeting("hi".to_string())) as Rc<dyn Any>) })
            }),
        );
        map.insert(
            TypeId::of::<Shout>(),
            Box::new(|ctx: &ResourceContext| -> BoxFuture<'_, Result<Rc<dyn Any>, Fail>> {
                Box::pin(async move {
                    let greeting = ctx.get::<Greeting>().await?;
                    Ok(Rc::new(Shout(greeting.0.to_uppercase())) as Rc<dyn Any>)
                })
            }),
        );
        Rc::new(map)
    }

    #[test]
    fn builds_a_resource_lazily_and_memoizes_it() {
        let ctx = ResourceContext::new(factories());
        let first = block_on(ctx.get::<Greeting>()).unwrap();
        let second = block_on(ctx.get::<Greeting>()).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn a_resource_can_depend_on_another_resource() {
        let ctx = ResourceContext::new(factories());
        let shout = block_on(ctx.get::<Shout>()).unwrap();
        assert_eq!(shout.0, "HI");
    }

    #[test]
    fn missing_factory_is_not_found() {
        struct Unregistered;
        let ctx = ResourceContext::new(factories());
        let err = block_on(ctx.get::<Unregistered>()).unwrap_err();
        assert!(matches!(err, Fail::NotFound { .. }));
    }
}
