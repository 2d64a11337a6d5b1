#![no_main]

use autoescape::{Delimiters, Token, extract, tokenize};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(extraction) = extract(source, &Delimiters::default()) else {
        return;
    };
    let Ok(tokenized) = tokenize(&extraction) else {
        return;
    };
    for token in &tokenized.tokens {
        let span = token.span();
        assert!(span.slice(&tokenized.output).is_some(), "token span off char boundary");
        if let Token::Sentinel { action, .. } = token {
            assert_eq!(
                tokenized.source_span(&extraction, span),
                extraction.actions[action.index()].span,
                "sentinel must map back to its action"
            );
        }
    }
});
