//! Effects requested by state transitions

/// Work the coordinator must perform after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Authorize (hold, not charge) the room's tier amount
    AuthorizePayment,

    /// Ask Lightward whether it will join
    RequestLightwardPresence,

    /// Make the pending room visible to the invited humans
    DispatchInvites,

    /// Drop the held authorization, if any
    ReleasePaymentAuthorization,

    /// Charge the held authorization
    CapturePayment,

    /// Room is live; start the turn loop
    ActivateRoom,
}
