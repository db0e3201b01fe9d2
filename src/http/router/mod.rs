// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Ties the endpoint trie, resource factories, and the per-connection
//! request/response loop together into a [Router], assembled from a
//! [RouterBuilder] before the server starts listening.

pub mod mount_path;
pub mod trie;

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::fail::Fail;
use crate::http::handler::Verb;
use crate::http::request::HttpRequest;
use crate::http::resource::{ResourceContext, ResourceFactory};
use crate::http::response::HttpResponse;
use crate::io::BufferedReader;
use crate::net::CoStream;
use trie::EndpointTrie;

pub use crate::http::handler::{Handler, HandlerFactory};

/// Assembles a frozen [Router] from route and resource-factory
/// registrations. Mirrors the explicit builder-then-freeze pattern the
/// process-wide registration design calls for -- no hidden static
/// side effects from route registration.
pub struct RouterBuilder {
    trie: EndpointTrie,
    factories: HashMap<TypeId, Box<dyn ResourceFactory>>,
    max_request_line_bytes: usize,
}

impl RouterBuilder {
    pub fn new() -> Self {
        RouterBuilder { trie: EndpointTrie::new(), factories: HashMap::new(), max_request_line_bytes: 64 * 1024 }
    }

    pub fn route(mut self, endpoint: &str, factory: Rc<dyn HandlerFactory>) -> Result<Self, Fail> {
        self.trie.insert(endpoint, factory)?;
        Ok(self)
    }

    pub fn resource<T: 'static>(mut self, factory: Box<dyn ResourceFactory>) -> Self {
        self.factories.insert(TypeId::of::<T>(), factory);
        self
    }

    pub fn build(self) -> Router {
        Router {
            trie: Rc::new(self.trie),
            factories: Rc::new(self.factories),
            connections: Rc::new(Cell::new(0)),
            max_request_line_bytes: self.max_request_line_bytes,
        }
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable, shareable set of mounted routes and resource factories.
/// Cloning is cheap -- every field is reference-counted -- so each
/// accepted connection gets its own handle while sharing the same trie.
#[derive(Clone)]
pub struct Router {
    trie: Rc<EndpointTrie>,
    factories: Rc<HashMap<TypeId, Box<dyn ResourceFactory>>>,
    connections: Rc<Cell<usize>>,
    max_request_line_bytes: usize,
}

impl Router {
    pub fn connection_count(&self) -> usize {
        self.connections.get()
    }

    /// Drives one accepted connection to completion: reads requests,
    /// matches and dispatches each against the trie, writes responses,
    /// and loops while the client asked to keep the connection alive.
    pub async fn serve_connection<S: CoStream>(&self, stream: S) -> Result<(), Fail> {
        self.connections.set(self.connections.get() + 1);
        let result = self.serve_connection_inner(stream).await;
        self.connections.set(self.connections.get() - 1);
        result
    }

    async fn serve_connection_inner<S: CoStream>(&self, stream: S) -> Result<(), Fail> {
        let mut reader = BufferedReader::new(stream, self.max_request_line_bytes);
        loop {
            let mut request = match HttpRequest::read_from(&mut reader).await {
                Ok(request) => request,
                Err(Fail::Unavailable { .. }) => return Ok(()),
                Err(err) => {
                    let response = HttpResponse::text(err.http_status(), err.message().to_string());
                    let _ = reader.get_mut().write(&response.serialize()).await;
                    return Ok(());
                }
            };

            let response = self.handle_one(&mut request).await;
            let keep_alive = request
                .headers
                .get("Connection")
                .map(|value| value.eq_ignore_ascii_case("keep-alive"))
                .unwrap_or(false);

            reader.get_mut().write(&response.serialize()).await?;
            if !keep_alive {
                return Ok(());
            }
        }
    }

    async fn handle_one(&self, request: &mut HttpRequest) -> HttpResponse {
        let matched = match self.trie.match_path(&request.path) {
            Some(matched) => matched,
            None => return HttpResponse::text(404, "Not Found."),
        };
        for (name, value) in matched.params {
            request.route_params.insert(name, value);
        }

        let handler = matched.handler.create();
        let verb = match Verb::from_method(&request.method) {
            Some(verb) => verb,
            None => return HttpResponse::text(404, "Not Found."),
        };
        if !handler.implemented_verbs().contains(&verb) {
            let allow = handler
                .implemented_verbs()
                .iter()
                .map(Verb::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            return HttpResponse::text(405, "Method Not Allowed.").with_header("Allow", allow);
        }

        let ctx = ResourceContext::new(self.factories.clone());
        let mut response = HttpResponse::new(200);
        let outcome: Result<(), Fail> = async {
            handler.pre_method(&ctx, request, &mut response).await?;
            handler.dispatch(verb, &ctx, request, &mut response).await?;
            handler.post_method(&ctx, request, &mut response).await?;
            Ok(())
        }
        .await;

        match outcome {
            // A handler-side error discards whatever partial response it may
            // have written; the serializer always starts from a fresh one.
            Err(err) => HttpResponse::text(err.http_status(), err.message().to_string()),
            Ok(()) => response,
        }
    }
}
