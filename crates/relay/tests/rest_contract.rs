const MAIN_SOURCE: &str = include_str!("../src/main.rs");
const API_MOD_SOURCE: &str = include_str!("../src/api/mod.rs");
const LIVE_EVENT_SOURCE: &str = include_str!("../src/api/live_event.rs");
const AUTH_MIDDLEWARE_SOURCE: &str = include_str!("../src/auth/middleware.rs");
const VALIDATION_SOURCE: &str = include_str!("../src/validation.rs");

#[test]
fn rest_contract_declares_endpoint_matrix() {
    let expectations = [
        (MAIN_SOURCE, "\"/healthz\"", "get(healthz)"),
        (MAIN_SOURCE, "\"/metrics\"", "get(render_metrics)"),
        (API_MOD_SOURCE, "\"/liveevent/send\"", "post(live_event::send_live_event)"),
    ];

    for (source, path, binding) in expectations {
        assert!(source.contains(path), "route {path} must be declared");
        assert!(source.contains(binding), "route {path} must bind {binding}");
    }
}

#[test]
fn rest_contract_whitelist_matches_public_surface() {
    assert!(AUTH_MIDDLEWARE_SOURCE
        .contains("const WHITE_LIST: &[&str] = &[\"/healthz\", \"/metrics\", \"/docs\"];"));
    assert!(AUTH_MIDDLEWARE_SOURCE.contains("pub const LIVE_PATH: &str = \"/live\";"));
    assert!(
        MAIN_SOURCE.contains("auth::middleware::require_bearer_auth"),
        "bearer auth must wrap every route of the top-level router"
    );
}

#[test]
fn rest_contract_live_event_payload_is_validated() {
    assert!(LIVE_EVENT_SOURCE.contains("ValidatedJson(message): ValidatedJson<LiveEventMessage>"));
    assert!(
        LIVE_EVENT_SOURCE.contains("userIds must not be empty"),
        "an empty recipient list must be rejected"
    );
    assert!(
        VALIDATION_SOURCE.contains("JsonRejection::MissingJsonContentType"),
        "non-JSON bodies must map to VALIDATION_FAILED"
    );
}

#[test]
fn rest_contract_body_limit_is_one_mebibyte() {
    assert_eq!(parse_usize_product(VALIDATION_SOURCE, "MAX_REST_BODY_BYTES"), 1024 * 1024);
    assert!(MAIN_SOURCE.contains("DefaultBodyLimit::max(MAX_REST_BODY_BYTES)"));
}

fn parse_usize_product(source: &str, const_name: &str) -> usize {
    let marker = format!("pub const {const_name}: usize = ");
    let start = source.find(&marker).expect("constant should exist") + marker.len();
    let rest = &source[start..];
    let end = rest.find(';').expect("constant should end with semicolon");
    rest[..end]
        .split('*')
        .map(|factor| factor.trim().replace('_', "").parse::<usize>().expect("numeric factor"))
        .product()
}
