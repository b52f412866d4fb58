//! Networking: URL algebra, wire protocol, TLS policy and the protocol client.

pub mod client;
pub mod dns;
pub mod mime;
pub mod protocol;
pub mod tls;
pub mod tls_backend;
pub mod transport;
pub mod url;

pub use client::ClientOptions;
pub use client::GeminiClient;
pub use client::Request;
pub use client::RequestState;
pub use mime::MimeType;
pub use protocol::Response;
pub use protocol::StatusClass;
pub use protocol::StatusCode;
pub use tls::TlsPolicy;
pub use tls::TlsVersion;
pub use self::url::ParsedUrl;
