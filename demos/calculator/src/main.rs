//! Calculator demo for meridian.
//!
//! Hosts a calculator in zone 1, attaches a client zone over the
//! in-process transport and invokes it once per supported encoding.

use std::sync::Arc;

use calculator_demo::{ArithmeticUnit, Calculator, CalculatorProxy, CalculatorStub};
use meridian_core::{cast, CallOptions, InprocTransport, ObjectProxy, Service};
use meridian_proto::{Encoding, KnownDirectionZone, Zone};
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    for encoding in [
        Encoding::Json,
        Encoding::Binary,
        Encoding::CompressedBinary,
        Encoding::ProtocolBuffers,
    ] {
        let host = Service::new("host", Zone::new(1));
        let client = Service::new("client", Zone::new(2));

        let descriptor = host.register_object(vec![CalculatorStub::new(Arc::new(ArithmeticUnit))]);

        let edge = client.attach_zone(
            "to-host",
            descriptor.destination_zone,
            InprocTransport::new(&host),
            CallOptions::default().with_encoding(encoding),
        );

        let object = ObjectProxy::attach(edge, descriptor, KnownDirectionZone::null())
            .await
            .expect("attach calculator");
        let calc: CalculatorProxy = cast(&object).await.expect("cast to Calculator");

        let sum = calc.add(100, 200).await.expect("add");
        let product = calc.multiply(6, 7).await.expect("multiply");
        info!(%encoding, sum, product, "calculator answered");

        object.release().await.expect("release");
    }
}
