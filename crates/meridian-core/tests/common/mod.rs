//! Shared helpers for the zone runtime integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use meridian_core::{link_zones, CallOptions, Service, ServiceProxy};
use meridian_proto::Zone;

/// Call options tuned for tests: short deadlines, binary payloads.
pub fn test_options() -> CallOptions {
    CallOptions::default().with_timeout(Duration::from_millis(500))
}

/// Two services in zones 1 and 2, linked both ways over the in-process
/// transport.
pub fn linked_pair() -> (
    Arc<Service>,
    Arc<Service>,
    Arc<ServiceProxy>,
    Arc<ServiceProxy>,
) {
    let host = Service::new("host", Zone::new(1));
    let client = Service::new("client", Zone::new(2));
    let (host_to_client, client_to_host) = link_zones(&host, &client, test_options());
    (host, client, host_to_client, client_to_host)
}
