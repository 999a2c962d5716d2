//! Reference counting across zone topologies: forwarding, races,
//! timeout compensation and the back channel.

mod common;

use std::sync::Arc;

use common::fixtures::calculator::{ArithmeticUnit, Calculator, CalculatorProxy, CalculatorStub};
use common::fixtures::instrumented::{CountingTransport, DroppedAckTransport};
use common::{linked_pair, test_options};
use meridian_core::{cast, InprocTransport, ObjectProxy, Service};
use meridian_proto::{
    AddRefOptions, BackChannelEntry, CallFrame, CallerZone, DestinationZone, Encoding, ErrorCode,
    KnownDirectionZone, MethodId, ObjectId, ReleaseFrame, ReleaseOptions, Zone,
};

fn local_release(object: ObjectId, zone: u64) -> ReleaseFrame {
    ReleaseFrame {
        protocol_version: meridian_proto::version::CURRENT,
        destination_zone: DestinationZone::new(zone),
        object,
        caller_zone: CallerZone::new(zone),
        options: ReleaseOptions::Normal,
        back_channel: Vec::new(),
    }
}

#[tokio::test]
async fn three_hop_forwarding_conserves_the_count() {
    let a = Service::new("a", Zone::new(1));
    let b = Service::new("b", Zone::new(2));
    let c = Service::new("c", Zone::new(3));

    // Every remote operation toward A goes through one counted transport.
    let counted = CountingTransport::new(InprocTransport::new(&a));
    let b_to_a = b.attach_zone("b->a", DestinationZone::new(1), counted.clone(), test_options());

    // C reaches zone 1 only through B.
    let c_to_a = c.attach_zone(
        "c->a-via-b",
        DestinationZone::new(1),
        InprocTransport::new(&b),
        test_options(),
    );

    // A hosts the object; the registration seed is held by A itself.
    let descriptor = a.register_object(vec![CalculatorStub::new(Arc::new(ArithmeticUnit))]);
    let stub = a.object_stub(descriptor.object).unwrap();
    assert_eq!(stub.total_refs(), 1);

    // A passes the object to B.
    let held_by_b = ObjectProxy::attach(b_to_a, descriptor, KnownDirectionZone::null())
        .await
        .unwrap();
    assert_eq!(stub.total_refs(), 2);

    // A hands off its own seed reference.
    a.handle_release(local_release(descriptor.object, 1))
        .await
        .unwrap();
    assert_eq!(stub.total_refs(), 1);

    // B passes the object on to C; C's add_ref transits B.
    let held_by_c = ObjectProxy::attach(c_to_a, descriptor, KnownDirectionZone::new(2))
        .await
        .unwrap();
    assert_eq!(stub.total_refs(), 2);
    assert_eq!(stub.refs_held_by(CallerZone::new(2)), 1);
    assert_eq!(stub.refs_held_by(CallerZone::new(3)), 1);

    // C releases, then B releases.
    held_by_c.release().await.unwrap();
    assert_eq!(stub.total_refs(), 1);

    held_by_b.release().await.unwrap();
    assert_eq!(stub.total_refs(), 0);

    // Exactly two remote add_refs and two remote releases reached A.
    assert_eq!(counted.add_refs_seen(), 2);
    assert_eq!(counted.releases_seen(), 2);

    // The stub is gone and the object id is dead.
    assert_eq!(a.object_count(), 0);
    let error = a
        .handle_release(local_release(descriptor.object, 2))
        .await
        .unwrap_err();
    assert_eq!(error, ErrorCode::ObjectNotFound);
}

#[tokio::test]
async fn concurrent_release_and_call_never_observe_a_half_dead_stub() {
    let (host, _client, _h2c, client_to_host) = linked_pair();
    let descriptor = host.register_object(vec![CalculatorStub::new(Arc::new(ArithmeticUnit))]);

    // Hand off the registration seed so the client holds the only reference.
    host.handle_release(local_release(descriptor.object, 1))
        .await
        .unwrap();

    let object = ObjectProxy::attach(client_to_host, descriptor, KnownDirectionZone::null())
        .await
        .unwrap();
    let calc: CalculatorProxy = cast(&object).await.unwrap();

    let releaser = {
        let object = calc.object().clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            object.release().await.unwrap();
        })
    };

    for _ in 0..64 {
        match calc.add(100, 200).await {
            Ok(sum) => assert_eq!(sum, 300),
            Err(code) => assert_eq!(code, ErrorCode::ObjectNotFound),
        }
        tokio::task::yield_now().await;
    }

    releaser.await.unwrap();
    assert_eq!(host.object_count(), 0);
}

#[tokio::test]
async fn add_ref_timeout_is_compensated() {
    let host = Service::new("host", Zone::new(1));
    let client = Service::new("client", Zone::new(2));
    let descriptor = host.register_object(vec![CalculatorStub::new(Arc::new(ArithmeticUnit))]);

    let stub = host.object_stub(descriptor.object).unwrap();
    let before = stub.total_refs();

    let flaky = DroppedAckTransport::new(InprocTransport::new(&host));
    let edge = client.attach_zone("to-host", descriptor.destination_zone, flaky, test_options());

    let error = ObjectProxy::attach(edge, descriptor, KnownDirectionZone::null())
        .await
        .unwrap_err();
    assert_eq!(error, ErrorCode::Timeout);

    // The owner saw the increment land and then the compensating release;
    // its count is back at the pre-operation value and the object is alive.
    assert_eq!(stub.total_refs(), before);
    assert_eq!(host.object_count(), 1);
}

#[tokio::test]
async fn at_most_one_service_proxy_per_destination_pair() {
    let host = Service::new("host", Zone::new(1));
    let client = Service::new("client", Zone::new(2));

    let first = client.attach_zone(
        "to-host",
        DestinationZone::new(1),
        InprocTransport::new(&host),
        test_options(),
    );
    let second = client.attach_zone(
        "to-host-again",
        DestinationZone::new(1),
        InprocTransport::new(&host),
        test_options(),
    );

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(client.proxy_count(), 1);
}

#[tokio::test]
async fn proxy_is_removed_with_its_last_object_proxy() {
    let (host, client, _h2c, client_to_host) = linked_pair();
    let descriptor = host.register_object(vec![CalculatorStub::new(Arc::new(ArithmeticUnit))]);

    let object = ObjectProxy::attach(client_to_host, descriptor, KnownDirectionZone::null())
        .await
        .unwrap();
    assert_eq!(client.proxy_count(), 1);

    object.release().await.unwrap();
    assert_eq!(client.proxy_count(), 0);
}

#[tokio::test]
async fn back_channel_entries_ride_along_with_a_call() {
    let (host, _client, _h2c, client_to_host) = linked_pair();
    let descriptor = host.register_object(vec![CalculatorStub::new(Arc::new(ArithmeticUnit))]);
    let stub = host.object_stub(descriptor.object).unwrap();

    let object = ObjectProxy::attach(client_to_host, descriptor, KnownDirectionZone::null())
        .await
        .unwrap();
    assert_eq!(stub.total_refs(), 2);

    // A forwarding zone would piggyback the downstream's add_ref and its own
    // transit release on the same frame instead of paying two round trips.
    let trailer = vec![
        BackChannelEntry::AddRef {
            destination_zone: descriptor.destination_zone,
            object: descriptor.object,
            caller_zone: CallerZone::new(5),
            known_direction_zone: KnownDirectionZone::new(2),
            options: AddRefOptions::Normal,
        },
        BackChannelEntry::Release {
            destination_zone: descriptor.destination_zone,
            object: descriptor.object,
            caller_zone: CallerZone::new(1),
            options: ReleaseOptions::Normal,
        },
    ];

    let encoding = object.service_proxy().encoding();
    let payload = meridian_proto::serialise(
        &common::fixtures::calculator::AddRequest { a: 1, b: 2 },
        encoding,
    )
    .unwrap();

    let result = object
        .send(
            common::fixtures::calculator::INTERFACE,
            MethodId::new(common::fixtures::calculator::METHOD_ADD),
            payload,
            trailer,
        )
        .await
        .unwrap();
    assert!(!result.payload.is_empty());

    // Zone 5 gained its reference, zone 1's transit reference is gone.
    assert_eq!(stub.refs_held_by(CallerZone::new(5)), 1);
    assert_eq!(stub.refs_held_by(CallerZone::new(1)), 0);
    assert_eq!(stub.total_refs(), 2);

    object.release().await.unwrap();
}

#[tokio::test]
async fn child_services_delegate_unknown_destinations_to_their_parent() {
    let parent = Service::new("parent", Zone::new(1));
    let sibling = Service::new("sibling", Zone::new(2));
    let child = Service::new("child", Zone::new(3));

    // The parent can reach the sibling; the child only knows its parent.
    parent.attach_zone(
        "parent->sibling",
        DestinationZone::new(2),
        InprocTransport::new(&sibling),
        test_options(),
    );
    let child_to_parent = child.attach_zone(
        "child->parent",
        DestinationZone::new(1),
        InprocTransport::new(&parent),
        test_options(),
    );
    child.set_parent(child_to_parent);

    let descriptor = sibling.register_object(vec![CalculatorStub::new(Arc::new(ArithmeticUnit))]);

    // A frame addressed to the sibling leaves the child through the parent
    // edge and is forwarded from there.
    let result = child
        .handle_send(CallFrame {
            protocol_version: meridian_proto::version::CURRENT,
            encoding: Encoding::Binary,
            tag: 1,
            caller_zone: CallerZone::new(3),
            destination_zone: descriptor.destination_zone,
            object: descriptor.object,
            interface: common::fixtures::calculator::INTERFACE,
            method: MethodId::new(common::fixtures::calculator::METHOD_ADD),
            payload: meridian_proto::serialise(
                &common::fixtures::calculator::AddRequest { a: 20, b: 22 },
                Encoding::Binary,
            )
            .unwrap(),
            back_channel: Vec::new(),
        })
        .await
        .unwrap();

    let response: common::fixtures::calculator::AddResponse =
        meridian_proto::deserialise(Encoding::Binary, &result.payload).unwrap();
    assert_eq!(response.r, 42);
}

#[tokio::test]
async fn build_out_param_channel_installs_a_reverse_edge() {
    let a = Service::new("a", Zone::new(1));
    let b = Service::new("b", Zone::new(2));

    // A can already reach B; zone 3's reference will arrive through B.
    a.attach_zone(
        "a->b",
        DestinationZone::new(2),
        InprocTransport::new(&b),
        test_options(),
    );
    let descriptor = a.register_object(vec![CalculatorStub::new(Arc::new(ArithmeticUnit))]);

    a.handle_add_ref(meridian_proto::AddRefFrame {
        protocol_version: meridian_proto::version::CURRENT,
        destination_zone: descriptor.destination_zone,
        object: descriptor.object,
        caller_zone: CallerZone::new(3),
        known_direction_zone: KnownDirectionZone::new(2),
        options: AddRefOptions::BuildOutParamChannel,
        back_channel: Vec::new(),
    })
    .await
    .unwrap();

    // The owner prepared to call back into zone 3 by cloning the edge the
    // reference arrived through.
    let reverse = a.proxy_for(DestinationZone::new(3)).unwrap();
    assert_eq!(reverse.destination(), DestinationZone::new(3));
}

#[tokio::test]
async fn unroutable_destination_is_unreachable() {
    let client = Service::new("client", Zone::new(2));

    let frame = CallFrame {
        protocol_version: meridian_proto::version::CURRENT,
        encoding: Encoding::Binary,
        tag: 1,
        caller_zone: CallerZone::new(2),
        destination_zone: DestinationZone::new(40),
        object: ObjectId::new(1),
        interface: meridian_proto::InterfaceOrdinal::new(1),
        method: MethodId::new(1),
        payload: Vec::new(),
        back_channel: Vec::new(),
    };

    assert_eq!(
        client.handle_send(frame).await.unwrap_err(),
        ErrorCode::ZoneUnreachable
    );
}
