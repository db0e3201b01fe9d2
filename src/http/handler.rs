// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Request handler lifecycle: verb dispatch, the `pre_method`/verb/
//! `post_method` hook chain, and the factory indirection the router keeps
//! one instance of per route.

use std::future::{ready, Future as StdFuture};
use std::pin::Pin;

use crate::fail::Fail;
use crate::http::request::HttpRequest;
use crate::http::resource::ResourceContext;
use crate::http::response::HttpResponse;

type MethodFuture<'a> = Pin<Box<dyn StdFuture<Output = Result<(), Fail>> + 'a>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

/// All dispatchable verbs, in the order an `Allow:` header lists them.
pub const ALL_VERBS: [Verb; 7] =
    [Verb::Get, Verb::Head, Verb::Post, Verb::Put, Verb::Delete, Verb::Patch, Verb::Options];

impl Verb {
    pub fn from_method(method: &str) -> Option<Verb> {
        match method {
            "GET" => Some(Verb::Get),
            "HEAD" => Some(Verb::Head),
            "POST" => Some(Verb::Post),
            "PUT" => Some(Verb::Put),
            "DELETE" => Some(Verb::Delete),
            "PATCH" => Some(Verb::Patch),
            "OPTIONS" => Some(Verb::Options),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Head => "HEAD",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::Patch => "PATCH",
            Verb::Options => "OPTIONS",
        }
    }
}

fn unimplemented(verb: Verb) -> MethodFuture<'static> {
    Box::pin(ready(Err(Fail::Unimplemented { message: format!("{} not implemented", verb.as_str()) })))
}

/// One request's behavior. A fresh `Handler` is built by the route's
/// [HandlerFactory] for every request, so it may hold request-scoped
/// state; verb methods default to "not implemented" and `implemented_verbs`
/// must list which ones a concrete handler overrides, so the router can
/// answer 405 with an accurate `Allow:` header without invoking the
/// handler at all.
pub trait Handler {
    fn implemented_verbs(&self) -> &'static [Verb] {
        &[]
    }

    fn pre_method<'a>(
        &'a self,
        _ctx: &'a ResourceContext,
        _request: &'a HttpRequest,
        _response: &'a mut HttpResponse,
    ) -> MethodFuture<'a> {
        Box::pin(ready(Ok(())))
    }

    fn post_method<'a>(
        &'a self,
        _ctx: &'a ResourceContext,
        _request: &'a HttpRequest,
        _response: &'a mut HttpResponse,
    ) -> MethodFuture<'a> {
        Box::pin(ready(Ok(())))
    }

    fn get<'a>(&'a self, _ctx: &'a ResourceContext, _request: &'a HttpRequest, _response: &'a mut HttpResponse) -> MethodFuture<'a> {
        unimplemented(Verb::Get)
    }
    fn head<'a>(&'a self, _ctx: &'a ResourceContext, _request: &'a HttpRequest, _response: &'a mut HttpResponse) -> MethodFuture<'a> {
        unimplemented(Verb::Head)
    }
    fn post<'a>(&'a self, _ctx: &'a ResourceContext, _request: &'a HttpRequest, _response: &'a mut HttpResponse) -> MethodFuture<'a> {
        unimplemented(Verb::Post)
    }
    fn put<'a>(&'a self, _ctx: &'a ResourceContext, _request: &'a HttpRequest, _response: &'a mut HttpResponse) -> MethodFuture<'a> {
        unimplemented(Verb::Put)
    }
    fn delete<'a>(&'a self, _ctx: &'a ResourceContext, _request: &'a HttpRequest, _response: &'a mut HttpResponse) -> MethodFuture<'a> {
        unimplemented(Verb::Delete)
    }
    fn patch<'a>(&'a self, _ctx: &'a ResourceContext, _request: &'a HttpRequest, _response: &'a mut HttpResponse) -> MethodFuture<'a> {
        unimplemented(Verb::Patch)
    }
    fn options<'a>(&'a self, _ctx: &'a ResourceContext, _request: &'a HttpRequest, _response: &'a mut HttpResponse) -> MethodFuture<'a> {
        unimplemented(Verb::Options)
    }

    fn dispatch<'a>(
        &'a self,
        verb: Verb,
        ctx: &'a ResourceContext,
        request: &'a HttpRequest,
        response: &'a mut HttpResponse,
    ) -> MethodFuture<'a> {
        match verb {
            Verb::Get => self.get(ctx, request, response),
            Verb::Head => self.head(ctx, request, response),
            Verb::Post => self.post(ctx, request, response),
            Verb::Put => self.put(ctx, request, response),
            Verb::Delete => self.delete(ctx, request, response),
            Verb::Patch => self.patch(ctx, request, response),
            Verb::Options => self.options(ctx, request, response),
        }
    }
}

/// Produces a fresh [Handler] for each request matched to this route. One
/// trait object per mounted path, not one per verb.
pub trait HandlerFactory {
    fn create(&self) -> Box<dyn Handler>;
}

impl<F> HandlerFactory for F
where
    F: Fn() -> Box<dyn Handler>,
{
    fn create(&self) -> Box<dyn Handler> {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    struct EchoHandler;

    impl Handler for EchoHandler {
        fn implemented_verbs(&self) -> &'static [Verb] {
            &[Verb::Get]
        }

        fn get<'a>(
            &'a self,
            _ctx: &'a ResourceContext,
            _request: &'a HttpRequest,
            response: &'a mut HttpResponse,
        ) -> MethodFuture<'a> {
            response.body = b"ok".to_vec();
            Box::pin(ready(Ok(())))
        }
    }

    #[test]
    fn default_verb_methods_are_unimplemented() {
        use std::collections::HashMap;
        use std::rc::Rc;

        let ctx = ResourceContext::new(Rc::new(HashMap::new()));
        let handler = EchoHandler;
        let request = crate::http::request::HttpRequest {
            method: "POST".into(),
            raw_path: "/".into(),
            path: "/".into(),
            version: "HTTP/1.1".into(),
            headers: Default::default(),
            query_params: Default::default(),
            route_params: Default::default(),
            content_length: 0,
            body: Vec::new(),
        };
        let mut response = HttpResponse::new(200);
        let err = block_on(handler.dispatch(Verb::Post, &ctx, &request, &mut response)).unwrap_err();
        assert!(matches!(err, Fail::Unimplemented { .. }));
    }

    #[test]
    fn implemented_verbs_lists_overrides() {
        let handler = EchoHandler;
        assert_eq!(handler.implemented_verbs(), &[Verb::Get]);
    }
}
