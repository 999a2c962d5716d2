//! Hand-written counterparts of generated interface code.
//!
//! The shapes here mirror what `meridian-gen` emits for an IDL interface:
//! a trait, per-method param structs, a typed proxy and a stub dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use meridian_core::{InterfaceStub, ObjectProxy, Proxied};
use meridian_proto::{
    deserialise, serialise, Encoding, ErrorCode, InterfaceOrdinal, MethodId, ProtocolError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

fn stub_decode_error(error: ProtocolError) -> ErrorCode {
    match error {
        ProtocolError::UnknownEncoding(_) | ProtocolError::UnsupportedEncoding(_) => {
            ErrorCode::InvalidEncoding
        }
        _ => ErrorCode::StubDeserialisationError,
    }
}

// ---- Calculator ------------------------------------------------------

pub mod calculator {
    use super::*;

    pub const INTERFACE: InterfaceOrdinal = InterfaceOrdinal::new(0x6A31_55C0_9D42_E017);

    pub const METHOD_ADD: u64 = 1;
    pub const METHOD_MULTIPLY: u64 = 2;

    #[async_trait]
    pub trait Calculator: Send + Sync {
        async fn add(&self, a: i64, b: i64) -> Result<i64, ErrorCode>;
        async fn multiply(&self, a: i64, b: i64) -> Result<i64, ErrorCode>;
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AddRequest {
        pub a: i64,
        pub b: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AddResponse {
        pub r: i64,
    }

    // The calculator stands in for an interface generated with protobuf
    // support: its protobuf hooks are overridden the way emitted mirrors
    // override them, so Encoding::ProtocolBuffers negotiates successfully.
    impl meridian_proto::Marshalled for AddRequest {
        fn protobuf_encode(&self) -> Result<Vec<u8>, ProtocolError> {
            let mut buf = Vec::with_capacity(16);
            buf.extend_from_slice(&self.a.to_le_bytes());
            buf.extend_from_slice(&self.b.to_le_bytes());
            Ok(buf)
        }

        fn protobuf_decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
            if bytes.len() != 16 {
                return Err(ProtocolError::Deserialisation("truncated request".into()));
            }
            Ok(Self {
                a: i64::from_le_bytes(bytes[..8].try_into().unwrap()),
                b: i64::from_le_bytes(bytes[8..].try_into().unwrap()),
            })
        }

        fn supports(_encoding: Encoding) -> bool {
            true
        }
    }

    impl meridian_proto::Marshalled for AddResponse {
        fn protobuf_encode(&self) -> Result<Vec<u8>, ProtocolError> {
            Ok(self.r.to_le_bytes().to_vec())
        }

        fn protobuf_decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
            if bytes.len() != 8 {
                return Err(ProtocolError::Deserialisation("truncated response".into()));
            }
            Ok(Self {
                r: i64::from_le_bytes(bytes.try_into().unwrap()),
            })
        }

        fn supports(_encoding: Encoding) -> bool {
            true
        }
    }

    pub struct CalculatorProxy {
        object: Arc<ObjectProxy>,
    }

    impl Proxied for CalculatorProxy {
        const INTERFACE: InterfaceOrdinal = INTERFACE;

        fn from_object(object: Arc<ObjectProxy>) -> Self {
            Self { object }
        }
    }

    impl CalculatorProxy {
        pub fn object(&self) -> &Arc<ObjectProxy> {
            &self.object
        }

        async fn invoke(&self, method: u64, a: i64, b: i64) -> Result<i64, ErrorCode> {
            let encoding = self.object.service_proxy().encoding();
            let payload = serialise(&AddRequest { a, b }, encoding)
                .map_err(|_| ErrorCode::ProxyDeserialisationError)?;

            let result = self
                .object
                .send(INTERFACE, MethodId::new(method), payload, Vec::new())
                .await?;

            let response: AddResponse = deserialise(encoding, &result.payload)
                .map_err(|_| ErrorCode::ProxyDeserialisationError)?;
            Ok(response.r)
        }
    }

    #[async_trait]
    impl Calculator for CalculatorProxy {
        async fn add(&self, a: i64, b: i64) -> Result<i64, ErrorCode> {
            self.invoke(METHOD_ADD, a, b).await
        }

        async fn multiply(&self, a: i64, b: i64) -> Result<i64, ErrorCode> {
            self.invoke(METHOD_MULTIPLY, a, b).await
        }
    }

    pub struct CalculatorStub<T> {
        implementation: Arc<T>,
    }

    impl<T: Calculator + 'static> CalculatorStub<T> {
        pub fn new(implementation: Arc<T>) -> Arc<dyn InterfaceStub> {
            Arc::new(Self { implementation })
        }
    }

    #[async_trait]
    impl<T: Calculator + 'static> InterfaceStub for CalculatorStub<T> {
        fn interface(&self) -> InterfaceOrdinal {
            INTERFACE
        }

        async fn call(
            &self,
            method: MethodId,
            encoding: Encoding,
            payload: &[u8],
        ) -> Result<Vec<u8>, ErrorCode> {
            match method.get() {
                METHOD_ADD | METHOD_MULTIPLY => {
                    let request: AddRequest =
                        deserialise(encoding, payload).map_err(super::stub_decode_error)?;

                    let r = if method.get() == METHOD_ADD {
                        self.implementation.add(request.a, request.b).await?
                    } else {
                        self.implementation.multiply(request.a, request.b).await?
                    };

                    serialise(&AddResponse { r }, encoding)
                        .map_err(|_| ErrorCode::StubDeserialisationError)
                }
                _ => Err(ErrorCode::MethodNotFound),
            }
        }
    }

    /// Reference implementation used by the tests.
    pub struct ArithmeticUnit;

    #[async_trait]
    impl Calculator for ArithmeticUnit {
        async fn add(&self, a: i64, b: i64) -> Result<i64, ErrorCode> {
            Ok(a + b)
        }

        async fn multiply(&self, a: i64, b: i64) -> Result<i64, ErrorCode> {
            Ok(a * b)
        }
    }
}

// ---- Recorder --------------------------------------------------------

pub mod recorder {
    use super::*;

    pub const INTERFACE: InterfaceOrdinal = InterfaceOrdinal::new(0x2F80_11AB_77C3_D904);

    pub const METHOD_RECORD: u64 = 1;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct RecordRequest {
        pub sequence: u64,
    }

    impl meridian_proto::Marshalled for RecordRequest {}

    /// Stub that appends every received sequence number, used to observe
    /// delivery order.
    pub struct RecorderStub {
        pub seen: Arc<Mutex<Vec<u64>>>,
    }

    impl RecorderStub {
        pub fn new() -> (Arc<dyn InterfaceStub>, Arc<Mutex<Vec<u64>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Arc::new(Self { seen: seen.clone() }),
                seen,
            )
        }
    }

    #[async_trait]
    impl InterfaceStub for RecorderStub {
        fn interface(&self) -> InterfaceOrdinal {
            INTERFACE
        }

        async fn call(
            &self,
            method: MethodId,
            encoding: Encoding,
            payload: &[u8],
        ) -> Result<Vec<u8>, ErrorCode> {
            if method.get() != METHOD_RECORD {
                return Err(ErrorCode::MethodNotFound);
            }

            let request: RecordRequest =
                deserialise(encoding, payload).map_err(super::stub_decode_error)?;
            self.seen.lock().push(request.sequence);
            Ok(Vec::new())
        }
    }
}

// ---- transport instrumentation ---------------------------------------

pub mod instrumented {
    use std::sync::atomic::{AtomicU64, Ordering};

    use meridian_core::{BackChannel, Transport};
    use meridian_proto::{AddRefFrame, CallFrame, CastFrame, ReleaseFrame, SendResult};

    use super::*;

    /// Wraps a transport and counts the refcount traffic passing through.
    pub struct CountingTransport {
        inner: Arc<dyn Transport>,
        pub add_refs: AtomicU64,
        pub releases: AtomicU64,
    }

    impl CountingTransport {
        pub fn new(inner: Arc<dyn Transport>) -> Arc<Self> {
            Arc::new(Self {
                inner,
                add_refs: AtomicU64::new(0),
                releases: AtomicU64::new(0),
            })
        }

        pub fn add_refs_seen(&self) -> u64 {
            self.add_refs.load(Ordering::SeqCst)
        }

        pub fn releases_seen(&self) -> u64 {
            self.releases.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(&self, frame: CallFrame) -> Result<SendResult, ErrorCode> {
            self.inner.send(frame).await
        }

        async fn post(&self, frame: CallFrame) -> Result<(), ErrorCode> {
            self.inner.post(frame).await
        }

        async fn try_cast(&self, frame: CastFrame) -> Result<BackChannel, ErrorCode> {
            self.inner.try_cast(frame).await
        }

        async fn add_ref(&self, frame: AddRefFrame) -> Result<BackChannel, ErrorCode> {
            self.add_refs.fetch_add(1, Ordering::SeqCst);
            self.inner.add_ref(frame).await
        }

        async fn release(&self, frame: ReleaseFrame) -> Result<BackChannel, ErrorCode> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            self.inner.release(frame).await
        }
    }

    /// Applies add_refs at the destination but never acknowledges them,
    /// simulating a transport that loses the acknowledgement frame.
    pub struct DroppedAckTransport {
        inner: Arc<dyn Transport>,
    }

    impl DroppedAckTransport {
        pub fn new(inner: Arc<dyn Transport>) -> Arc<Self> {
            Arc::new(Self { inner })
        }
    }

    #[async_trait]
    impl Transport for DroppedAckTransport {
        async fn send(&self, frame: CallFrame) -> Result<SendResult, ErrorCode> {
            self.inner.send(frame).await
        }

        async fn post(&self, frame: CallFrame) -> Result<(), ErrorCode> {
            self.inner.post(frame).await
        }

        async fn try_cast(&self, frame: CastFrame) -> Result<BackChannel, ErrorCode> {
            self.inner.try_cast(frame).await
        }

        async fn add_ref(&self, frame: AddRefFrame) -> Result<BackChannel, ErrorCode> {
            // The increment lands at the owner, the acknowledgement does not.
            let _ = self.inner.add_ref(frame).await;
            std::future::pending().await
        }

        async fn release(&self, frame: ReleaseFrame) -> Result<BackChannel, ErrorCode> {
            self.inner.release(frame).await
        }
    }
}
