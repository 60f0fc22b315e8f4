mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use burrow_rpc::config::{DEFAULT_MAX_MULTI_PART_BYTES, DEFAULT_SESSION_TIMEOUT};
use burrow_rpc::wire::codec::decode_body;
use burrow_rpc::wire::{MessageStatus, MultiPartRequest, MultiPartResponse, METHOD_MULTI};
use burrow_rpc::{
    CallDispatch, ClientConfig, DetailLevel, Guid, InprocTransport, InvalidDataError, RpcClient,
    RpcConfig, RpcServer, TypeResolution,
};
use common::{search_router, ObservingTransport};
use tempfile::NamedTempFile;

const FULL: &str = r#"
[server]
exception_detail = "message_only"
multi_part = true
max_multi_part_bytes = 4096

[client]
type_resolution = "any_assembly"
multi_part_threshold = 65536

[sessions]
enabled = true
timeout_secs = 30
sweep_interval_secs = 0
"#;

#[test]
fn parses_every_section() {
    let cfg = RpcConfig::from_toml(FULL).expect("parse");
    assert_eq!(cfg.server.exception_detail, DetailLevel::MessageOnly);
    assert!(cfg.server.multi_part);
    assert_eq!(cfg.server.max_multi_part_bytes, 4096);
    assert_eq!(cfg.client.type_resolution, TypeResolution::AnyAssembly);
    assert_eq!(cfg.client.multi_part_threshold, Some(65536));
    assert_eq!(cfg.sessions.timeout(), Duration::from_secs(30));
    assert_eq!(cfg.sessions.sweep_interval(), Duration::from_secs(1));
}

#[test]
fn missing_sections_use_defaults() {
    let cfg = RpcConfig::from_toml("").expect("parse");
    assert_eq!(cfg, RpcConfig::default());
    assert_eq!(cfg.server.exception_detail, DetailLevel::FullDetails);
    assert!(!cfg.server.multi_part);
    assert_eq!(cfg.server.max_multi_part_bytes, DEFAULT_MAX_MULTI_PART_BYTES);
    assert_eq!(cfg.client.type_resolution, TypeResolution::LoadedOnly);
    assert!(cfg.sessions.enabled);
    assert_eq!(cfg.sessions.timeout(), DEFAULT_SESSION_TIMEOUT);

    let cfg = RpcConfig::from_toml("[sessions]\nenabled = false\n").expect("parse");
    assert!(!cfg.sessions.enabled);
    assert_eq!(cfg.sessions.timeout(), DEFAULT_SESSION_TIMEOUT);
}

#[test]
fn rejects_unknown_policy_names() {
    assert!(RpcConfig::from_toml("[server]\nexception_detail = \"everything\"\n").is_err());
    assert!(RpcConfig::from_toml("[client]\ntype_resolution = \"LoadedOnly\"\n").is_err());
}

#[test]
fn loads_config_from_file() {
    let file = NamedTempFile::new().expect("temp file");
    fs::write(file.path(), FULL).expect("write");
    let cfg = RpcConfig::from_path(file.path()).expect("load");
    assert_eq!(cfg.server.exception_detail, DetailLevel::MessageOnly);

    fs::write(file.path(), "[server\n").expect("write");
    let err = RpcConfig::from_path(file.path()).expect_err("malformed");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn server_applies_its_section() {
    let cfg = RpcConfig::from_toml(FULL).expect("parse");
    let server = Arc::new(RpcServer::from_config(search_router(), &cfg));
    assert_eq!(server.detail_level(), DetailLevel::MessageOnly);
    assert!(server.is_multi_part_enabled());
    assert_eq!(server.sessions().timeout(), Duration::from_secs(30));

    let client = RpcClient::new(InprocTransport::new(Arc::clone(&server)));
    let oversized = MultiPartRequest {
        transaction_id: Guid::new_random(),
        method: "Digest".into(),
        status: MessageStatus::Continue,
        current_position: 0,
        bytes_sent: 16,
        total_bytes: 8192,
        payload: vec![0u8; 16],
    };
    let err = client.call::<_, MultiPartResponse>(METHOD_MULTI, &oversized).expect_err("limit");
    assert!(err.remote().expect("remote").is::<InvalidDataError>());
}

#[test]
fn client_applies_its_section() {
    let server = Arc::new(RpcServer::new(search_router()));
    let cfg = ClientConfig {
        type_resolution: TypeResolution::CoreOnly,
        multi_part_threshold: Some(4096),
    };
    let transport = InprocTransport::new(Arc::clone(&server));
    let client = RpcClient::with_config(transport, &cfg).expect("client");
    assert_eq!(client.type_resolution(), TypeResolution::CoreOnly);
    assert_eq!(client.multi_part_threshold(), Some(4096));

    let cfg = ClientConfig { multi_part_threshold: Some(100), ..ClientConfig::default() };
    let err = RpcClient::with_config(InprocTransport::new(server), &cfg).expect_err("threshold");
    assert!(err.is_configuration());
}

#[test]
fn configured_threshold_chunks_large_requests() {
    let server = Arc::new(RpcServer::new(search_router()).enable_multi_part());
    let cfg = ClientConfig { multi_part_threshold: Some(4096), ..ClientConfig::default() };
    let client = RpcClient::with_config(ObservingTransport::new(&server), &cfg).expect("client");

    let body: Vec<u8> = (0..10_000u32).map(|idx| (idx % 13) as u8).collect();
    let plain = RpcClient::new(InprocTransport::new(Arc::clone(&server)));
    let expected: (u64, u64) =
        decode_body(&plain.call_raw("Digest", &body).expect("plain")).expect("digest");
    let chunked: (u64, u64) =
        decode_body(&client.call_raw("Digest", &body).expect("chunked")).expect("digest");
    assert_eq!(chunked, expected);
    assert_eq!(client.transport().multi_calls(), 4);

    let (len, _): (u64, u64) =
        decode_body(&client.call_raw("Digest", &body[..4095]).expect("small")).expect("digest");
    assert_eq!(len, 4095);
    assert_eq!(client.transport().multi_calls(), 4);
}
