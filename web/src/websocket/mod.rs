//! WebSocket entry points. Each route upgrades the request and hands the
//! split socket to the hub with the interest set of that route.

pub(crate) mod handler;
mod transport;
