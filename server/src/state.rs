use ryft_claims::ClaimDesk;

/// Shared application state available to all route handlers via Axum's
/// `State` extractor.
pub struct AppState {
    /// Claim store plus its order feed, account, delivery and chat
    /// collaborators. All interior state is behind the store's own lock.
    pub desk: ClaimDesk,
}
