//! Zone runtime for meridian inter-zone RPC.
//!
//! A *zone* is an isolation domain (process, enclave, connection) with its
//! own [`Service`]: the container of locally hosted objects and of the
//! outbound [`ServiceProxy`] edges toward every reachable peer. Calls on a
//! typed proxy are marshalled by generated code, routed through the edge
//! that fronts the owning zone, dispatched to the object's stub and answered
//! the same way back.
//!
//! Lifetime is governed by the cross-zone reference counting protocol:
//! every descriptor that crosses a boundary consumes a reference in the
//! source and produces one in the destination, forwarding zones piggyback
//! their transfer bookkeeping on the frames they forward, and an object's
//! stub is destroyed exactly when the last holder anywhere in the topology
//! releases it.

mod config;
mod member;
mod object_proxy;
mod refcount;
mod service;
mod service_proxy;
mod stub;
mod transport;

pub use config::CallOptions;
pub use member::MemberCell;
pub use object_proxy::{cast, same_zone, ObjectProxy, Proxied};
pub use refcount::CallerCounts;
pub use service::Service;
pub use service_proxy::ServiceProxy;
pub use stub::{InterfaceStub, ObjectStub};
pub use transport::{link_zones, BackChannel, InprocTransport, Transport};
