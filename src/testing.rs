//! Helpers shared by the unit tests.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::request::Request;

pub(crate) fn peer() -> SocketAddr {
    "192.0.2.10:40000".parse().unwrap()
}

/// `GET path` from [`peer`] with no headers.
pub(crate) fn get(path: &str) -> Request {
    request(http::Request::get(path))
}

pub(crate) fn request(builder: http::request::Builder) -> Request {
    Request::from_http(builder.body(Bytes::new()).unwrap(), peer())
}
