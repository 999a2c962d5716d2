//! Calculator interface for the demo.
//!
//! The code below follows the shape `meridian-gen` emits for a calculator
//! IDL with protobuf enabled: the interface trait with its stable ordinal,
//! one request/response struct pair per method, prost mirrors behind the
//! `Marshalled` protobuf hooks, a typed proxy and a stub dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use meridian_core::{InterfaceStub, ObjectProxy, Proxied};
use meridian_proto::{
    deserialise, serialise, Encoding, ErrorCode, InterfaceOrdinal, MethodId, ProtocolError,
};
use serde::{Deserialize, Serialize};

/// Stable ordinal of `Calculator` at protocol version 3.
pub const CALCULATOR_INTERFACE: InterfaceOrdinal = InterfaceOrdinal::new(0x7D95_60F1_8A2C_43BE);

pub const CALCULATOR_METHOD_ADD: u64 = 1;
pub const CALCULATOR_METHOD_MULTIPLY: u64 = 2;

#[async_trait]
pub trait Calculator: Send + Sync {
    async fn add(&self, a: i64, b: i64) -> Result<i64, ErrorCode>;
    async fn multiply(&self, a: i64, b: i64) -> Result<i64, ErrorCode>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculatorAddRequest {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculatorAddResponse {
    pub r: i64,
}

impl meridian_proto::Marshalled for CalculatorAddRequest {
    fn protobuf_encode(&self) -> Result<Vec<u8>, ProtocolError> {
        pb::encode(&pb::CalculatorAddRequest::from(self))
    }

    fn protobuf_decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        pb::decode::<pb::CalculatorAddRequest>(bytes).map(Into::into)
    }

    fn supports(_encoding: Encoding) -> bool {
        true
    }
}

impl meridian_proto::Marshalled for CalculatorAddResponse {
    fn protobuf_encode(&self) -> Result<Vec<u8>, ProtocolError> {
        pb::encode(&pb::CalculatorAddResponse::from(self))
    }

    fn protobuf_decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        pb::decode::<pb::CalculatorAddResponse>(bytes).map(Into::into)
    }

    fn supports(_encoding: Encoding) -> bool {
        true
    }
}

/// prost mirrors backing the Protocol Buffers encoding.
pub mod pb {
    use meridian_proto::ProtocolError;
    use prost::Message as _;

    pub fn encode<T: prost::Message>(value: &T) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(value.encoded_len());
        value
            .encode(&mut buf)
            .map_err(|e| ProtocolError::Serialisation(e.to_string()))?;
        Ok(buf)
    }

    pub fn decode<T: prost::Message + Default>(bytes: &[u8]) -> Result<T, ProtocolError> {
        T::decode(bytes).map_err(|e| ProtocolError::Deserialisation(e.to_string()))
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CalculatorAddRequest {
        #[prost(int64, tag = "1")]
        pub a: i64,
        #[prost(int64, tag = "2")]
        pub b: i64,
    }

    impl From<&super::CalculatorAddRequest> for CalculatorAddRequest {
        fn from(value: &super::CalculatorAddRequest) -> Self {
            Self {
                a: value.a,
                b: value.b,
            }
        }
    }

    impl From<CalculatorAddRequest> for super::CalculatorAddRequest {
        fn from(value: CalculatorAddRequest) -> Self {
            Self {
                a: value.a,
                b: value.b,
            }
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct CalculatorAddResponse {
        #[prost(int64, tag = "1")]
        pub r: i64,
    }

    impl From<&super::CalculatorAddResponse> for CalculatorAddResponse {
        fn from(value: &super::CalculatorAddResponse) -> Self {
            Self { r: value.r }
        }
    }

    impl From<CalculatorAddResponse> for super::CalculatorAddResponse {
        fn from(value: CalculatorAddResponse) -> Self {
            Self { r: value.r }
        }
    }
}

/// Typed client-side proxy for `Calculator`.
pub struct CalculatorProxy {
    object: Arc<ObjectProxy>,
}

impl Proxied for CalculatorProxy {
    const INTERFACE: InterfaceOrdinal = CALCULATOR_INTERFACE;

    fn from_object(object: Arc<ObjectProxy>) -> Self {
        Self { object }
    }
}

impl CalculatorProxy {
    /// The untyped handle behind this proxy.
    pub fn object(&self) -> &Arc<ObjectProxy> {
        &self.object
    }

    async fn invoke(&self, method: u64, a: i64, b: i64) -> Result<i64, ErrorCode> {
        let encoding = self.object.service_proxy().encoding();
        let payload = serialise(&CalculatorAddRequest { a, b }, encoding)
            .map_err(|_| ErrorCode::ProxyDeserialisationError)?;

        let result = self
            .object
            .send(
                CALCULATOR_INTERFACE,
                MethodId::new(method),
                payload,
                Vec::new(),
            )
            .await?;

        let response: CalculatorAddResponse = deserialise(encoding, &result.payload)
            .map_err(|_| ErrorCode::ProxyDeserialisationError)?;
        Ok(response.r)
    }
}

#[async_trait]
impl Calculator for CalculatorProxy {
    async fn add(&self, a: i64, b: i64) -> Result<i64, ErrorCode> {
        self.invoke(CALCULATOR_METHOD_ADD, a, b).await
    }

    async fn multiply(&self, a: i64, b: i64) -> Result<i64, ErrorCode> {
        self.invoke(CALCULATOR_METHOD_MULTIPLY, a, b).await
    }
}

fn stub_decode_error(error: ProtocolError) -> ErrorCode {
    match error {
        ProtocolError::UnknownEncoding(_) | ProtocolError::UnsupportedEncoding(_) => {
            ErrorCode::InvalidEncoding
        }
        _ => ErrorCode::StubDeserialisationError,
    }
}

/// Server-side dispatcher for `Calculator`.
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
        CALCULATOR_INTERFACE
    }

    async fn call(
        &self,
        method: MethodId,
        encoding: Encoding,
        payload: &[u8],
    ) -> Result<Vec<u8>, ErrorCode> {
        match method.get() {
            CALCULATOR_METHOD_ADD | CALCULATOR_METHOD_MULTIPLY => {
                let request: CalculatorAddRequest =
                    deserialise(encoding, payload).map_err(stub_decode_error)?;

                let r = if method.get() == CALCULATOR_METHOD_ADD {
                    self.implementation.add(request.a, request.b).await?
                } else {
                    self.implementation.multiply(request.a, request.b).await?
                };

                serialise(&CalculatorAddResponse { r }, encoding)
                    .map_err(|_| ErrorCode::StubDeserialisationError)
            }
            _ => Err(ErrorCode::MethodNotFound),
        }
    }
}

/// The hosted implementation.
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
