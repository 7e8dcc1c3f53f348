use super::*;

#[test]
fn test_none_is_the_only_success() {
    assert!(StatusCode::None.is_ok());
    assert!(StatusCode::None.into_result().is_ok());
    assert!(!StatusCode::NoResult.is_ok());
    assert_eq!(
        StatusCode::NoResult.into_result(),
        Err(GeofenceError::NoResult)
    );
}

#[test]
fn test_every_error_maps_back_to_its_status() {
    let errors = [
        GeofenceError::Parameter,
        GeofenceError::Memory,
        GeofenceError::Connection,
        GeofenceError::AccessDenied,
        GeofenceError::DbusCall,
        GeofenceError::NoResult,
    ];
    for err in errors {
        let status: StatusCode = err.into();
        assert!(!status.is_ok());
        assert_eq!(GeofenceError::from_status(status), Some(err));
    }
    assert_eq!(GeofenceError::from_status(StatusCode::None), None);
}

#[test]
fn test_default_status_is_success() {
    assert_eq!(StatusCode::default(), StatusCode::None);
}

#[test]
fn test_display_names() {
    assert_eq!(StatusCode::DbusCallError.to_string(), "DbusCallError");
    assert!(GeofenceError::AccessDenied.to_string().contains("Access denied"));
}
