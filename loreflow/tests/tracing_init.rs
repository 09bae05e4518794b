//! Global subscriber installation, kept in its own test binary so the
//! subscriber does not leak into the library's unit tests.

use loreflow::errors::LoreflowError;
use loreflow::observability::{init_tracing, LogFormat};

#[test]
fn test_second_init_fails() {
    init_tracing(LogFormat::Json).unwrap();

    let err = init_tracing(LogFormat::Pretty).unwrap_err();
    assert!(matches!(err, LoreflowError::Config(_)));
}
