// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! HTTP/1.1 request routing: wire parsing and serialization, the endpoint
//! trie, per-request resource injection, and the handler lifecycle.

pub mod handler;
pub mod headers;
pub mod request;
pub mod resource;
pub mod response;
pub mod router;

pub use handler::{Handler, HandlerFactory, Verb};
pub use headers::HeaderMap;
pub use request::HttpRequest;
pub use resource::ResourceContext;
pub use response::HttpResponse;
pub use router::{Router, RouterBuilder};
