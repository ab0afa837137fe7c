//! Fault Catalog
//!
//! Every fault the registry can simulate, keyed by the name a test driver
//! selects it with.

/// Transport-layer faults - raw TCP accept/forward control
pub mod transport {
    /// Proxy behaves normally; validates the harness
    pub const NULL: &str = "NullTransportFault";
    /// Proxy stops accepting connections
    pub const CONNECTION_REFUSED: &str = "TcpConnectionRefused";
    /// Live connection stays open but forwards nothing
    pub const CONNECTION_UNRESPONSIVE: &str = "TcpConnectionUnresponsive";
    /// Proxy goes down, then restarts by itself after the suspend delay
    pub const DISCONNECT_AND_SUSPEND: &str = "DisconnectAndSuspend";
}

/// Application-layer faults - protocol frame interception
pub mod application {
    /// Interceptor passes everything; validates the harness
    pub const NULL: &str = "NullApplicationLayerFault";
    /// First outgoing ATTACH is dropped
    pub const ATTACH_UNRESPONSIVE: &str = "AttachUnresponsive";
    /// First outgoing DETACH is dropped
    pub const DETACH_UNRESPONSIVE: &str = "DetachUnresponsive";
    /// Connection goes silent after an outgoing PRESENCE
    pub const ENTER_UNRESPONSIVE: &str = "EnterUnresponsive";
    /// Disconnect after ATTACHED, then corrupt the resume token
    pub const DISCONNECT_WITH_FAILED_RESUME: &str = "DisconnectWithFailedResume";
    /// Presence ENTER answered with injected NACKs
    pub const ENTER_FAILED_WITH_NONFATAL_NACK: &str = "EnterFailedWithNonfatalNack";
    /// Presence UPDATE answered with injected NACKs
    pub const UPDATE_FAILED_WITH_NONFATAL_NACK: &str = "UpdateFailedWithNonfatalNack";
    /// Resume succeeds but presence re-entry fails
    pub const REENTER_ON_RESUME_FAILED: &str = "ReenterOnResumeFailed";
}

/// All fault names for iteration
pub const ALL_FAULTS: &[&str] = &[
    // Transport
    transport::NULL,
    transport::CONNECTION_REFUSED,
    transport::CONNECTION_UNRESPONSIVE,
    transport::DISCONNECT_AND_SUSPEND,
    // Application
    application::NULL,
    application::ATTACH_UNRESPONSIVE,
    application::DETACH_UNRESPONSIVE,
    application::ENTER_UNRESPONSIVE,
    application::DISCONNECT_WITH_FAILED_RESUME,
    application::ENTER_FAILED_WITH_NONFATAL_NACK,
    application::UPDATE_FAILED_WITH_NONFATAL_NACK,
    application::REENTER_ON_RESUME_FAILED,
];
