// Copyright ⓒ 2024-2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Kafka wire protocol, without any I/O.
//!
//! Frames are encoded and decoded from bytes. Message bodies are plain
//! structures that are walked by a serde [`Encoder`] and [`Decoder`], driven
//! by the static version tables in `mimic-model`.
//!
//! ```
//! use mimic_sans_io::{ApiKey as _, Frame, Header, MetadataRequest, metadata::MetadataRequestTopic};
//!
//! let encoded = Frame::request(
//!     Header::Request {
//!         api_key: MetadataRequest::KEY,
//!         api_version: 9,
//!         correlation_id: 7,
//!         client_id: Some("console".into()),
//!     },
//!     MetadataRequest::default()
//!         .topics(Some(vec![MetadataRequestTopic::default().name("orders".into())]))
//!         .into(),
//! )?;
//!
//! let frame = Frame::request_from_bytes(encoded)?;
//! assert_eq!(7, frame.correlation_id()?);
//! # Ok::<(), mimic_sans_io::Error>(())
//! ```

/// Declares a message structure with a field update builder per field.
///
/// Field order is wire order, and must match the field table of the message.
macro_rules! message {
    (
        $(#[$meta:meta])*
        $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident: $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, serde::Deserialize, Eq, PartialEq, serde::Serialize)]
        #[serde(default)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl $name {
            $(
                #[must_use]
                pub fn $field(self, $field: $ty) -> Self {
                    Self { $field, ..self }
                }
            )*
        }
    };
}

pub mod api_versions;
pub mod buffer;
pub mod create_topics;
mod de;
pub mod fetch;
pub mod find_coordinator;
pub mod heartbeat;
pub mod init_producer_id;
pub mod join_group;
pub mod leave_group;
pub mod list_groups;
pub mod list_offsets;
pub mod metadata;
pub mod offset_commit;
pub mod offset_fetch;
pub mod primitive;
pub mod produce;
pub mod record;
mod ser;
pub mod sync_group;

pub use api_versions::{ApiVersionsRequest, ApiVersionsResponse};
pub use create_topics::{CreateTopicsRequest, CreateTopicsResponse};
pub use de::Decoder;
pub use fetch::{FetchRequest, FetchResponse};
pub use find_coordinator::{FindCoordinatorRequest, FindCoordinatorResponse};
pub use heartbeat::{HeartbeatRequest, HeartbeatResponse};
pub use init_producer_id::{InitProducerIdRequest, InitProducerIdResponse};
pub use join_group::{JoinGroupRequest, JoinGroupResponse};
pub use leave_group::{LeaveGroupRequest, LeaveGroupResponse};
pub use list_groups::{ListGroupsRequest, ListGroupsResponse};
pub use list_offsets::{ListOffsetsRequest, ListOffsetsResponse};
pub use metadata::{MetadataRequest, MetadataResponse};
pub use offset_commit::{OffsetCommitRequest, OffsetCommitResponse};
pub use offset_fetch::{OffsetFetchRequest, OffsetFetchResponse};
pub use produce::{ProduceRequest, ProduceResponse};
pub use ser::Encoder;
pub use sync_group::{SyncGroupRequest, SyncGroupResponse};

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    io::{self, Read},
    num::TryFromIntError,
    string::FromUtf8Error,
    sync::{Arc, OnceLock},
    time::{Duration, SystemTime, SystemTimeError, UNIX_EPOCH},
};

use bytes::{Buf, Bytes, TryGetError};
use buffer::Paged;
use mimic_model::{MessageKind, MessageMeta};
use primitive::varint::{read_unsigned, write_unsigned};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    Api(ErrorCode),
    CompressionNotSupported(Compression),
    CorrelationMismatch { expected: i32, actual: i32 },
    FromUtf8(FromUtf8Error),
    InvalidCrc { expected: u32, computed: u32 },
    InvalidCoordinatorType(i8),
    InvalidIsolationLevel(i8),
    Io(Arc<io::Error>),
    Message(String),
    MismatchedBody { api_key: i16, body: &'static str },
    NoSuchField(&'static str),
    PatchOutOfBounds { position: usize, length: usize, len: usize },
    ResponseFrame,
    SystemTime(SystemTimeError),
    TryFromInt(#[from] TryFromIntError),
    TryGet(Arc<TryGetError>),
    UnknownApiErrorCode(i16),
    UnknownApiKey(i16),
    UnknownCompressionType(i16),
    UnknownMagic(i8),
    UnsupportedType(&'static str),
    UnsupportedVersion { api_key: i16, api_version: i16 },
    VarIntOverflow,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Message(e) => f.write_str(e),
            e => write!(f, "{e:?}"),
        }
    }
}

impl serde::ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl serde::de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::Message(msg.to_string())
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<TryGetError> for Error {
    fn from(value: TryGetError) -> Self {
        Self::TryGet(Arc::new(value))
    }
}

impl From<FromUtf8Error> for Error {
    fn from(value: FromUtf8Error) -> Self {
        Self::FromUtf8(value)
    }
}

impl From<SystemTimeError> for Error {
    fn from(value: SystemTimeError) -> Self {
        Self::SystemTime(value)
    }
}

pub trait Encode {
    fn encode(&self) -> Result<Bytes>;
}

pub trait Decode: Sized {
    fn decode(encoded: &mut Bytes) -> Result<Self>;
}

pub trait ApiKey {
    const KEY: i16;
}

pub trait ApiName {
    const NAME: &'static str;
}

/// Static metadata of every supported message, keyed by API key.
#[derive(Debug)]
pub struct RootMessageMeta {
    requests: BTreeMap<i16, &'static MessageMeta>,
    responses: BTreeMap<i16, &'static MessageMeta>,
}

impl RootMessageMeta {
    fn new() -> Self {
        let (requests, responses) = MESSAGE_META.iter().fold(
            (BTreeMap::new(), BTreeMap::new()),
            |(mut requests, mut responses), meta| {
                match meta.message_kind {
                    MessageKind::Request => {
                        _ = requests.insert(meta.api_key, *meta);
                    }

                    MessageKind::Response => {
                        _ = responses.insert(meta.api_key, *meta);
                    }
                }

                (requests, responses)
            },
        );

        Self {
            requests,
            responses,
        }
    }

    pub fn messages() -> &'static RootMessageMeta {
        static MAPPING: OnceLock<RootMessageMeta> = OnceLock::new();
        MAPPING.get_or_init(RootMessageMeta::new)
    }

    #[must_use]
    pub fn requests(&self) -> &BTreeMap<i16, &'static MessageMeta> {
        &self.requests
    }

    #[must_use]
    pub fn responses(&self) -> &BTreeMap<i16, &'static MessageMeta> {
        &self.responses
    }

    fn request(&self, api_key: i16) -> Result<&'static MessageMeta> {
        self.requests
            .get(&api_key)
            .copied()
            .ok_or(Error::UnknownApiKey(api_key))
    }

    fn response(&self, api_key: i16) -> Result<&'static MessageMeta> {
        self.responses
            .get(&api_key)
            .copied()
            .ok_or(Error::UnknownApiKey(api_key))
    }
}

macro_rules! body {
    ($($module:ident: $request:ident, $response:ident = $key:literal);+ $(;)?) => {
        static MESSAGE_META: &[&MessageMeta] = &[$(&$module::REQUEST, &$module::RESPONSE),+];

        /// The body of a request or response frame.
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub enum Body {
            $(
                $request($request),
                $response($response),
            )+
        }

        $(
            impl ApiKey for $request {
                const KEY: i16 = $key;
            }

            impl ApiName for $request {
                const NAME: &'static str = stringify!($request);
            }

            impl ApiKey for $response {
                const KEY: i16 = $key;
            }

            impl ApiName for $response {
                const NAME: &'static str = stringify!($response);
            }

            impl From<$request> for Body {
                fn from(value: $request) -> Self {
                    Self::$request(value)
                }
            }

            impl From<$response> for Body {
                fn from(value: $response) -> Self {
                    Self::$response(value)
                }
            }

            impl TryFrom<Body> for $request {
                type Error = Error;

                fn try_from(body: Body) -> Result<Self, Self::Error> {
                    if let Body::$request(inner) = body {
                        Ok(inner)
                    } else {
                        Err(Error::MismatchedBody {
                            api_key: <$request as ApiKey>::KEY,
                            body: body.api_name(),
                        })
                    }
                }
            }

            impl TryFrom<Body> for $response {
                type Error = Error;

                fn try_from(body: Body) -> Result<Self, Self::Error> {
                    if let Body::$response(inner) = body {
                        Ok(inner)
                    } else {
                        Err(Error::MismatchedBody {
                            api_key: <$response as ApiKey>::KEY,
                            body: body.api_name(),
                        })
                    }
                }
            }
        )+

        impl Body {
            #[must_use]
            pub fn api_key(&self) -> i16 {
                match self {
                    $(
                        Self::$request(_) => <$request as ApiKey>::KEY,
                        Self::$response(_) => <$response as ApiKey>::KEY,
                    )+
                }
            }

            #[must_use]
            pub fn api_name(&self) -> &'static str {
                match self {
                    $(
                        Self::$request(_) => <$request as ApiName>::NAME,
                        Self::$response(_) => <$response as ApiName>::NAME,
                    )+
                }
            }

            #[must_use]
            pub fn is_request(&self) -> bool {
                match self {
                    $(
                        Self::$request(_) => true,
                        Self::$response(_) => false,
                    )+
                }
            }

            fn serialize_into(&self, encoder: &mut Encoder<'_>) -> Result<()> {
                match self {
                    $(
                        Self::$request(inner) => inner.serialize(&mut *encoder),
                        Self::$response(inner) => inner.serialize(&mut *encoder),
                    )+
                }
            }

            fn request_from(api_key: i16, decoder: &mut Decoder<'_>) -> Result<Self> {
                match api_key {
                    $(
                        key if key == <$request as ApiKey>::KEY => {
                            $request::deserialize(&mut *decoder).map(Self::from)
                        }
                    )+
                    otherwise => Err(Error::UnknownApiKey(otherwise)),
                }
            }

            fn response_from(api_key: i16, decoder: &mut Decoder<'_>) -> Result<Self> {
                match api_key {
                    $(
                        key if key == <$response as ApiKey>::KEY => {
                            $response::deserialize(&mut *decoder).map(Self::from)
                        }
                    )+
                    otherwise => Err(Error::UnknownApiKey(otherwise)),
                }
            }
        }
    };
}

body! {
    produce: ProduceRequest, ProduceResponse = 0;
    fetch: FetchRequest, FetchResponse = 1;
    list_offsets: ListOffsetsRequest, ListOffsetsResponse = 2;
    metadata: MetadataRequest, MetadataResponse = 3;
    offset_commit: OffsetCommitRequest, OffsetCommitResponse = 8;
    offset_fetch: OffsetFetchRequest, OffsetFetchResponse = 9;
    find_coordinator: FindCoordinatorRequest, FindCoordinatorResponse = 10;
    join_group: JoinGroupRequest, JoinGroupResponse = 11;
    heartbeat: HeartbeatRequest, HeartbeatResponse = 12;
    leave_group: LeaveGroupRequest, LeaveGroupResponse = 13;
    sync_group: SyncGroupRequest, SyncGroupResponse = 14;
    list_groups: ListGroupsRequest, ListGroupsResponse = 16;
    api_versions: ApiVersionsRequest, ApiVersionsResponse = 18;
    create_topics: CreateTopicsRequest, CreateTopicsResponse = 19;
    init_producer_id: InitProducerIdRequest, InitProducerIdResponse = 22;
}

/// A request or response header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Header {
    Request {
        api_key: i16,
        api_version: i16,
        correlation_id: i32,
        client_id: Option<String>,
    },

    Response {
        correlation_id: i32,
    },
}

fn read_i16(reader: &mut dyn Read) -> Result<i16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(i16::from_be_bytes(buf))
}

fn read_i32(reader: &mut dyn Read) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

/// Skip every tagged field, returning the number skipped.
pub(crate) fn skip_tag_buffer(reader: &mut dyn Read) -> Result<u32> {
    let count = read_unsigned(reader)?;

    for _ in 0..count {
        let tag = read_unsigned(reader)?;
        let size = read_unsigned(reader)?;
        debug!(tag, size);

        let skipped = io::copy(&mut (&mut *reader).take(u64::from(size)), &mut io::sink())?;
        if skipped != u64::from(size) {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
    }

    Ok(count)
}

impl Header {
    fn write_request(&self, writer: &mut Paged, flexible: bool) -> Result<()> {
        let Header::Request {
            api_key,
            api_version,
            correlation_id,
            client_id,
        } = self
        else {
            return Err(Error::ResponseFrame);
        };

        writer.put_i16(*api_key);
        writer.put_i16(*api_version);
        writer.put_i32(*correlation_id);

        // the client id is never a compact string
        if let Some(client_id) = client_id {
            writer.put_i16(i16::try_from(client_id.len())?);
            writer.put_slice(client_id.as_bytes());
        } else {
            writer.put_i16(-1);
        }

        if flexible {
            write_unsigned(writer, 0)?;
        }

        Ok(())
    }

    fn read_request(reader: &mut dyn Read) -> Result<(Self, &'static MessageMeta)> {
        let api_key = read_i16(reader)?;
        let api_version = read_i16(reader)?;
        let correlation_id = read_i32(reader)?;

        let client_id = match read_i16(reader)? {
            length if length < 0 => None,
            length => {
                let mut client_id = vec![0u8; usize::try_from(length)?];
                reader.read_exact(&mut client_id)?;
                String::from_utf8(client_id).map(Some)?
            }
        };

        let meta = RootMessageMeta::messages().request(api_key)?;

        if meta.is_flexible(api_version) {
            _ = skip_tag_buffer(reader)?;
        }

        Ok((
            Self::Request {
                api_key,
                api_version,
                correlation_id,
                client_id,
            },
            meta,
        ))
    }
}

/// The response header of ApiVersions is never flexible, so that a client
/// can always read the versions a broker supports.
fn is_flexible_response_header(meta: &MessageMeta, api_version: i16) -> bool {
    meta.api_key != ApiVersionsResponse::KEY && meta.is_flexible(api_version)
}

/// A length prefixed frame: size, header and body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub size: i32,
    pub header: Header,
    pub body: Body,
}

impl Frame {
    fn patch_size(mut encoded: Paged) -> Result<Bytes> {
        let size = i32::try_from(encoded.len() - 4)?;
        encoded.patch(0, &size.to_be_bytes())?;
        Ok(encoded.freeze().into_bytes())
    }

    /// Encode a request frame.
    #[instrument(skip_all)]
    pub fn request(header: Header, body: Body) -> Result<Bytes> {
        let Header::Request {
            api_key,
            api_version,
            ..
        } = header
        else {
            return Err(Error::ResponseFrame);
        };

        if body.api_key() != api_key || !body.is_request() {
            return Err(Error::MismatchedBody {
                api_key,
                body: body.api_name(),
            });
        }

        let meta = RootMessageMeta::messages().request(api_key)?;

        if !meta.is_valid(api_version) {
            return Err(Error::UnsupportedVersion {
                api_key,
                api_version,
            });
        }

        let mut encoded = Paged::new();
        encoded.put_i32(0);
        header.write_request(&mut encoded, meta.is_flexible(api_version))?;

        body.serialize_into(&mut Encoder::new(&mut encoded, meta, api_version))?;

        Self::patch_size(encoded).inspect(|encoded| debug!(api_key, len = encoded.len()))
    }

    /// Decode a request frame.
    ///
    /// An ApiVersions request with a version that is not supported decodes
    /// with an empty body, so that the broker can reply with the versions
    /// it does support.
    #[instrument(skip_all)]
    pub fn request_from_bytes(encoded: impl Buf) -> Result<Frame> {
        let mut reader = encoded.reader();
        let size = read_i32(&mut reader)?;

        let (header, meta) = Header::read_request(&mut reader)?;

        let Header::Request {
            api_key,
            api_version,
            ..
        } = header
        else {
            return Err(Error::ResponseFrame);
        };

        let body = if meta.is_valid(api_version) {
            Body::request_from(api_key, &mut Decoder::new(&mut reader, meta, api_version))?
        } else if api_key == ApiVersionsRequest::KEY {
            warn!(api_key, api_version);
            ApiVersionsRequest::default().into()
        } else {
            return Err(Error::UnsupportedVersion {
                api_key,
                api_version,
            });
        };

        Ok(Frame { size, header, body })
    }

    /// Encode a response frame, for a request of `api_key` and `api_version`.
    #[instrument(skip_all)]
    pub fn response(header: Header, body: Body, api_key: i16, api_version: i16) -> Result<Bytes> {
        let Header::Response { correlation_id } = header else {
            return Err(Error::MismatchedBody {
                api_key,
                body: body.api_name(),
            });
        };

        if body.api_key() != api_key || body.is_request() {
            return Err(Error::MismatchedBody {
                api_key,
                body: body.api_name(),
            });
        }

        let meta = RootMessageMeta::messages().response(api_key)?;

        if !meta.is_valid(api_version) {
            return Err(Error::UnsupportedVersion {
                api_key,
                api_version,
            });
        }

        let mut encoded = Paged::new();
        encoded.put_i32(0);
        encoded.put_i32(correlation_id);

        if is_flexible_response_header(meta, api_version) {
            write_unsigned(&mut encoded, 0)?;
        }

        body.serialize_into(&mut Encoder::new(&mut encoded, meta, api_version))?;

        Self::patch_size(encoded).inspect(|encoded| debug!(api_key, len = encoded.len()))
    }

    /// Decode a response frame, for a request of `api_key` and `api_version`.
    #[instrument(skip_all)]
    pub fn response_from_bytes(bytes: impl Buf, api_key: i16, api_version: i16) -> Result<Frame> {
        let meta = RootMessageMeta::messages().response(api_key)?;

        if !meta.is_valid(api_version) {
            return Err(Error::UnsupportedVersion {
                api_key,
                api_version,
            });
        }

        let mut reader = bytes.reader();
        let size = read_i32(&mut reader)?;
        let correlation_id = read_i32(&mut reader)?;

        if is_flexible_response_header(meta, api_version) {
            _ = skip_tag_buffer(&mut reader)?;
        }

        let body = Body::response_from(api_key, &mut Decoder::new(&mut reader, meta, api_version))?;

        Ok(Frame {
            size,
            header: Header::Response { correlation_id },
            body,
        })
    }

    /// Decode a response frame, verifying that it answers `correlation_id`.
    pub fn correlated_response_from_bytes(
        bytes: impl Buf,
        api_key: i16,
        api_version: i16,
        correlation_id: i32,
    ) -> Result<Frame> {
        Self::response_from_bytes(bytes, api_key, api_version).and_then(|frame| {
            let actual = frame.correlation_id()?;

            if actual == correlation_id {
                Ok(frame)
            } else {
                Err(Error::CorrelationMismatch {
                    expected: correlation_id,
                    actual,
                })
            }
        })
    }

    pub fn api_key(&self) -> Result<i16> {
        if let Header::Request { api_key, .. } = self.header {
            Ok(api_key)
        } else {
            Err(Error::ResponseFrame)
        }
    }

    #[must_use]
    pub fn api_name(&self) -> &'static str {
        self.body.api_name()
    }

    pub fn api_version(&self) -> Result<i16> {
        if let Header::Request { api_version, .. } = self.header {
            Ok(api_version)
        } else {
            Err(Error::ResponseFrame)
        }
    }

    pub fn correlation_id(&self) -> Result<i32> {
        match self.header {
            Header::Request { correlation_id, .. } | Header::Response { correlation_id } => {
                Ok(correlation_id)
            }
        }
    }

    pub fn client_id(&self) -> Result<Option<&str>> {
        if let Header::Request { ref client_id, .. } = self.header {
            Ok(client_id.as_deref())
        } else {
            Err(Error::ResponseFrame)
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorCode {
    UnknownServerError,
    None,
    OffsetOutOfRange,
    CorruptMessage,
    UnknownTopicOrPartition,
    InvalidFetchSize,
    LeaderNotAvailable,
    NotLeaderOrFollower,
    RequestTimedOut,
    BrokerNotAvailable,
    ReplicaNotAvailable,
    MessageTooLarge,
    StaleControllerEpoch,
    OffsetMetadataTooLarge,
    NetworkException,
    CoordinatorLoadInProgress,
    CoordinatorNotAvailable,
    NotCoordinator,
    InvalidTopicException,
    RecordListTooLarge,
    NotEnoughReplicas,
    NotEnoughReplicasAfterAppend,
    InvalidRequiredAcks,
    IllegalGeneration,
    InconsistentGroupProtocol,
    InvalidGroupId,
    UnknownMemberId,
    InvalidSessionTimeout,
    RebalanceInProgress,
    InvalidCommitOffsetSize,
    TopicAuthorizationFailed,
    GroupAuthorizationFailed,
    ClusterAuthorizationFailed,
    InvalidTimestamp,
    UnsupportedSaslMechanism,
    IllegalSaslState,
    UnsupportedVersion,
    TopicAlreadyExists,
    InvalidPartitions,
    InvalidReplicationFactor,
    InvalidReplicaAssignment,
    InvalidConfig,
    NotController,
    InvalidRequest,
    UnsupportedForMessageFormat,
    PolicyViolation,
    OutOfOrderSequenceNumber,
    DuplicateSequenceNumber,
    InvalidProducerEpoch,
    InvalidTxnState,
    InvalidProducerIdMapping,
    InvalidTransactionTimeout,
    ConcurrentTransactions,
    UnsupportedCompressionType,
    MemberIdRequired,
    GroupMaxSizeReached,
    UnstableOffsetCommit,
}

const ERROR_CODES: [(ErrorCode, i16, &str); 57] = [
    (
        ErrorCode::UnknownServerError,
        -1,
        "The server experienced an unexpected error when processing the request.",
    ),
    (ErrorCode::None, 0, ""),
    (
        ErrorCode::OffsetOutOfRange,
        1,
        "The requested offset is not within the range of offsets maintained by the server.",
    ),
    (
        ErrorCode::CorruptMessage,
        2,
        "This message has failed its CRC checksum, exceeds the valid size, has a null key for a compacted topic, or is otherwise corrupt.",
    ),
    (
        ErrorCode::UnknownTopicOrPartition,
        3,
        "This server does not host this topic-partition.",
    ),
    (
        ErrorCode::InvalidFetchSize,
        4,
        "The requested fetch size is invalid.",
    ),
    (
        ErrorCode::LeaderNotAvailable,
        5,
        "There is no leader for this topic-partition as we are in the middle of a leadership election.",
    ),
    (
        ErrorCode::NotLeaderOrFollower,
        6,
        "For requests intended only for the leader, this error indicates that the broker is not the current leader.",
    ),
    (
        ErrorCode::RequestTimedOut,
        7,
        "The request timed out.",
    ),
    (
        ErrorCode::BrokerNotAvailable,
        8,
        "The broker is not available.",
    ),
    (
        ErrorCode::ReplicaNotAvailable,
        9,
        "The replica is not available for the requested topic-partition.",
    ),
    (
        ErrorCode::MessageTooLarge,
        10,
        "The request included a message larger than the max message size the server will accept.",
    ),
    (
        ErrorCode::StaleControllerEpoch,
        11,
        "The controller moved to another broker.",
    ),
    (
        ErrorCode::OffsetMetadataTooLarge,
        12,
        "The metadata field of the offset request was too large.",
    ),
    (
        ErrorCode::NetworkException,
        13,
        "The server disconnected before a response was received.",
    ),
    (
        ErrorCode::CoordinatorLoadInProgress,
        14,
        "The coordinator is loading and hence can't process requests.",
    ),
    (
        ErrorCode::CoordinatorNotAvailable,
        15,
        "The coordinator is not available.",
    ),
    (
        ErrorCode::NotCoordinator,
        16,
        "This is not the correct coordinator.",
    ),
    (
        ErrorCode::InvalidTopicException,
        17,
        "The request attempted to perform an operation on an invalid topic.",
    ),
    (
        ErrorCode::RecordListTooLarge,
        18,
        "The request included message batch larger than the configured segment size on the server.",
    ),
    (
        ErrorCode::NotEnoughReplicas,
        19,
        "Messages are rejected since there are fewer in-sync replicas than required.",
    ),
    (
        ErrorCode::NotEnoughReplicasAfterAppend,
        20,
        "Messages are written to the log, but to fewer in-sync replicas than required.",
    ),
    (
        ErrorCode::InvalidRequiredAcks,
        21,
        "Produce request specified an invalid value for required acks.",
    ),
    (
        ErrorCode::IllegalGeneration,
        22,
        "Specified group generation id is not valid.",
    ),
    (
        ErrorCode::InconsistentGroupProtocol,
        23,
        "The group member's supported protocols are incompatible with those of existing members or first group member tried to join with empty protocol type or empty protocol list.",
    ),
    (
        ErrorCode::InvalidGroupId,
        24,
        "The configured groupId is invalid.",
    ),
    (
        ErrorCode::UnknownMemberId,
        25,
        "The coordinator is not aware of this member.",
    ),
    (
        ErrorCode::InvalidSessionTimeout,
        26,
        "The session timeout is not within the range allowed by the broker.",
    ),
    (
        ErrorCode::RebalanceInProgress,
        27,
        "The group is rebalancing, so a rejoin is needed.",
    ),
    (
        ErrorCode::InvalidCommitOffsetSize,
        28,
        "The committing offset data size is not valid.",
    ),
    (
        ErrorCode::TopicAuthorizationFailed,
        29,
        "Topic authorization failed.",
    ),
    (
        ErrorCode::GroupAuthorizationFailed,
        30,
        "Group authorization failed.",
    ),
    (
        ErrorCode::ClusterAuthorizationFailed,
        31,
        "Cluster authorization failed.",
    ),
    (
        ErrorCode::InvalidTimestamp,
        32,
        "The timestamp of the message is out of acceptable range.",
    ),
    (
        ErrorCode::UnsupportedSaslMechanism,
        33,
        "The broker does not support the requested SASL mechanism.",
    ),
    (
        ErrorCode::IllegalSaslState,
        34,
        "Request is not valid given the current SASL state.",
    ),
    (
        ErrorCode::UnsupportedVersion,
        35,
        "The version of API is not supported.",
    ),
    (
        ErrorCode::TopicAlreadyExists,
        36,
        "Topic with this name already exists.",
    ),
    (
        ErrorCode::InvalidPartitions,
        37,
        "Number of partitions is below 1.",
    ),
    (
        ErrorCode::InvalidReplicationFactor,
        38,
        "Replication factor is below 1 or larger than the number of available brokers.",
    ),
    (
        ErrorCode::InvalidReplicaAssignment,
        39,
        "Replica assignment is invalid.",
    ),
    (
        ErrorCode::InvalidConfig,
        40,
        "Configuration is invalid.",
    ),
    (
        ErrorCode::NotController,
        41,
        "This is not the correct controller for this cluster.",
    ),
    (
        ErrorCode::InvalidRequest,
        42,
        "This most likely occurs because of a request being malformed by the client library or the message was sent to an incompatible broker.",
    ),
    (
        ErrorCode::UnsupportedForMessageFormat,
        43,
        "The message format version on the broker does not support the request.",
    ),
    (
        ErrorCode::PolicyViolation,
        44,
        "Request parameters do not satisfy the configured policy.",
    ),
    (
        ErrorCode::OutOfOrderSequenceNumber,
        45,
        "The broker received an out of order sequence number.",
    ),
    (
        ErrorCode::DuplicateSequenceNumber,
        46,
        "The broker received a duplicate sequence number.",
    ),
    (
        ErrorCode::InvalidProducerEpoch,
        47,
        "Producer attempted to produce with an old epoch.",
    ),
    (
        ErrorCode::InvalidTxnState,
        48,
        "The producer attempted a transactional operation in an invalid state.",
    ),
    (
        ErrorCode::InvalidProducerIdMapping,
        49,
        "The producer attempted to use a producer id which is not currently assigned to its transactional id.",
    ),
    (
        ErrorCode::InvalidTransactionTimeout,
        50,
        "The transaction timeout is larger than the maximum value allowed by the broker.",
    ),
    (
        ErrorCode::ConcurrentTransactions,
        51,
        "The producer attempted to update a transaction while another concurrent operation on the same transaction was ongoing.",
    ),
    (
        ErrorCode::UnsupportedCompressionType,
        76,
        "The requesting client does not support the compression type of given partition.",
    ),
    (
        ErrorCode::MemberIdRequired,
        79,
        "The group member needs to have a valid member id before actually entering a consumer group.",
    ),
    (
        ErrorCode::GroupMaxSizeReached,
        81,
        "The consumer group has reached its max size.",
    ),
    (
        ErrorCode::UnstableOffsetCommit,
        88,
        "There are unstable offsets that need to be cleared.",
    ),
];

impl ErrorCode {
    fn entry(&self) -> Option<&'static (ErrorCode, i16, &'static str)> {
        ERROR_CODES.iter().find(|(code, ..)| code == self)
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        self.entry().map_or("", |(_, _, description)| description)
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<ErrorCode> for i16 {
    fn from(value: ErrorCode) -> Self {
        value.entry().map_or(-1, |(_, code, _)| *code)
    }
}

impl From<&ErrorCode> for i16 {
    fn from(value: &ErrorCode) -> Self {
        Self::from(*value)
    }
}

impl TryFrom<i16> for ErrorCode {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        ERROR_CODES
            .iter()
            .find(|(_, code, _)| *code == value)
            .map(|(error_code, ..)| *error_code)
            .ok_or(Error::UnknownApiErrorCode(value))
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}: {}", self.description())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum IsolationLevel {
    #[default]
    ReadUncommitted,
    ReadCommitted,
}

impl TryFrom<i8> for IsolationLevel {
    type Error = Error;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ReadUncommitted),
            1 => Ok(Self::ReadCommitted),
            otherwise => Err(Error::InvalidIsolationLevel(otherwise)),
        }
    }
}

impl From<IsolationLevel> for i8 {
    fn from(value: IsolationLevel) -> Self {
        match value {
            IsolationLevel::ReadUncommitted => 0,
            IsolationLevel::ReadCommitted => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CoordinatorType {
    #[default]
    Group,
    Transaction,
    Share,
}

impl TryFrom<i8> for CoordinatorType {
    type Error = Error;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Group),
            1 => Ok(Self::Transaction),
            2 => Ok(Self::Share),
            otherwise => Err(Error::InvalidCoordinatorType(otherwise)),
        }
    }
}

impl From<CoordinatorType> for i8 {
    fn from(value: CoordinatorType) -> Self {
        match value {
            CoordinatorType::Group => 0,
            CoordinatorType::Transaction => 1,
            CoordinatorType::Share => 2,
        }
    }
}

/// The timestamp used to locate an offset in ListOffsets.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ListOffset {
    Earliest,
    Latest,
    Timestamp(SystemTime),
}

impl TryFrom<i64> for ListOffset {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -2 => Ok(Self::Earliest),
            -1 => Ok(Self::Latest),
            timestamp => to_system_time(timestamp).map(Self::Timestamp),
        }
    }
}

impl TryFrom<ListOffset> for i64 {
    type Error = Error;

    fn try_from(value: ListOffset) -> Result<Self, Self::Error> {
        match value {
            ListOffset::Earliest => Ok(-2),
            ListOffset::Latest => Ok(-1),
            ListOffset::Timestamp(system_time) => to_timestamp(&system_time),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl TryFrom<i16> for Compression {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value & BatchAttribute::COMPRESSION_MASK {
            0 => Ok(Self::None),
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Snappy),
            3 => Ok(Self::Lz4),
            4 => Ok(Self::Zstd),
            otherwise => Err(Error::UnknownCompressionType(otherwise)),
        }
    }
}

impl From<Compression> for i16 {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => 0,
            Compression::Gzip => 1,
            Compression::Snappy => 2,
            Compression::Lz4 => 3,
            Compression::Zstd => 4,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum TimestampType {
    #[default]
    CreateTime,
    LogAppendTime,
}

/// Batch attributes: compression, timestamp type, transactional and control flags.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BatchAttribute {
    pub compression: Compression,
    pub timestamp: TimestampType,
    pub transaction: bool,
    pub control: bool,
}

impl BatchAttribute {
    const COMPRESSION_MASK: i16 = 0b111;
    const TIMESTAMP_TYPE_BITMASK: i16 = 0b1000;
    const TRANSACTIONAL_BITMASK: i16 = 0b1_0000;
    const CONTROL_BITMASK: i16 = 0b10_0000;

    #[must_use]
    pub fn compression(self, compression: Compression) -> Self {
        Self {
            compression,
            ..self
        }
    }

    #[must_use]
    pub fn timestamp(self, timestamp: TimestampType) -> Self {
        Self { timestamp, ..self }
    }

    #[must_use]
    pub fn transaction(self, transaction: bool) -> Self {
        Self {
            transaction,
            ..self
        }
    }

    #[must_use]
    pub fn control(self, control: bool) -> Self {
        Self { control, ..self }
    }
}

impl From<BatchAttribute> for i16 {
    fn from(value: BatchAttribute) -> Self {
        let mut attributes = i16::from(value.compression);

        if value.timestamp == TimestampType::LogAppendTime {
            attributes |= BatchAttribute::TIMESTAMP_TYPE_BITMASK;
        }

        if value.transaction {
            attributes |= BatchAttribute::TRANSACTIONAL_BITMASK;
        }

        if value.control {
            attributes |= BatchAttribute::CONTROL_BITMASK;
        }

        attributes
    }
}

impl TryFrom<i16> for BatchAttribute {
    type Error = Error;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Compression::try_from(value).map(|compression| Self {
            compression,
            timestamp: if value & Self::TIMESTAMP_TYPE_BITMASK == 0 {
                TimestampType::CreateTime
            } else {
                TimestampType::LogAppendTime
            },
            transaction: value & Self::TRANSACTIONAL_BITMASK != 0,
            control: value & Self::CONTROL_BITMASK != 0,
        })
    }
}

/// Milliseconds since the epoch into a system time.
pub fn to_system_time(timestamp: i64) -> Result<SystemTime> {
    u64::try_from(timestamp)
        .map(|timestamp| UNIX_EPOCH + Duration::from_millis(timestamp))
        .map_err(Into::into)
}

/// A system time into milliseconds since the epoch.
pub fn to_timestamp(system_time: &SystemTime) -> Result<i64> {
    system_time
        .duration_since(UNIX_EPOCH)
        .map_err(Into::into)
        .and_then(|since_epoch| i64::try_from(since_epoch.as_millis()).map_err(Into::into))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_code_round_trip() -> Result<()> {
        for (error_code, code, _) in ERROR_CODES {
            assert_eq!(code, i16::from(error_code));
            assert_eq!(error_code, ErrorCode::try_from(code)?);
        }

        assert!(ErrorCode::try_from(-2).is_err());
        Ok(())
    }

    #[test]
    fn batch_attribute() -> Result<()> {
        let attributes = BatchAttribute::default()
            .timestamp(TimestampType::LogAppendTime)
            .transaction(true);

        assert_eq!(0b1_1000, i16::from(attributes));
        assert_eq!(attributes, BatchAttribute::try_from(0b1_1000)?);

        assert_eq!(
            Compression::Lz4,
            BatchAttribute::try_from(3).map(|attributes| attributes.compression)?
        );

        Ok(())
    }

    #[test]
    fn list_offset() -> Result<()> {
        assert_eq!(ListOffset::Earliest, ListOffset::try_from(-2)?);
        assert_eq!(ListOffset::Latest, ListOffset::try_from(-1)?);
        assert_eq!(
            1_707_058_170_165,
            i64::try_from(ListOffset::try_from(1_707_058_170_165)?)?
        );
        Ok(())
    }

    #[test]
    fn every_message_is_registered() {
        let messages = RootMessageMeta::messages();
        assert_eq!(15, messages.requests().len());
        assert_eq!(15, messages.responses().len());

        assert_eq!(
            vec![0, 1, 2, 3, 8, 9, 10, 11, 12, 13, 14, 16, 18, 19, 22],
            messages.requests().keys().copied().collect::<Vec<_>>()
        );
    }
}
