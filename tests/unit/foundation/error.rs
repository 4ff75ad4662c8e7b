use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        MapAnimError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        MapAnimError::render("x")
            .to_string()
            .contains("render error:")
    );
    assert!(MapAnimError::cache("x").to_string().contains("cache error:"));
    assert!(
        MapAnimError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = MapAnimError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
