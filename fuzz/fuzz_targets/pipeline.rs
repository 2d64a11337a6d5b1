#![no_main]

use autoescape::{ActionKind, EscapeConfig, escape_template};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    let config = EscapeConfig::default();
    let first = escape_template(source, &config);
    match &first {
        Ok(escaped) => {
            for action in &escaped.actions {
                assert!(
                    action.chain.is_empty() || action.kind == ActionKind::Output,
                    "only value-emitting actions get escapers"
                );
                assert!(action.span.slice(source).is_some(), "action span out of bounds");
            }
        }
        Err(err) => {
            assert!(err.span().end <= source.len(), "error span out of bounds");
        }
    }
    assert_eq!(first, escape_template(source, &config), "escaping must be deterministic");
});
