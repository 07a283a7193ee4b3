//! TypeScript Generation Tests
//!
//! Validates that the host-facing biostream types can be exported to TypeScript
//! when the tauri feature is enabled.

#[cfg(feature = "tauri")]
#[test]
fn test_core_types_implement_specta_type() {
    use specta::Type;

    // If this compiles, all types are properly configured for TypeScript export.
    fn assert_type<T: Type>() {}

    // Lifecycle
    assert_type::<biostream::SessionState>();
    assert_type::<biostream::ConnectionState>();
    assert_type::<biostream::StopOutcome>();

    // Configuration
    assert_type::<biostream::AcquisitionConfig>();
    assert_type::<biostream::SourceConfig>();
    assert_type::<biostream::ManagerConfig>();
    assert_type::<biostream::BufferStats>();

    // Devices and events
    assert_type::<biostream::ScanDomain>();
    assert_type::<biostream::DeviceAddress>();
    assert_type::<biostream::DeviceInfo>();
    assert_type::<biostream::DeviceEvent>();
}

#[cfg(not(feature = "tauri"))]
#[test]
fn test_tauri_feature_disabled() {
    // Types still compile without specta::Type
    let _ = biostream::SessionState::Idle;
}
