use passage_core::{Identity, ProviderIdentity};

/// Per-request authentication state.
///
/// Created by the caller for each inbound request and passed explicitly through
/// the two resolution stages. Starts anonymous.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
    provider_identity: Option<ProviderIdentity>,
    identity: Option<Identity>,
    ident: Option<String>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider_identity(&self) -> Option<&ProviderIdentity> {
        self.provider_identity.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Debug tag of whatever was resolved last (`provider:id`, then `type:user`).
    pub fn ident(&self) -> Option<&str> {
        self.ident.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub(crate) fn set_provider_identity(&mut self, provider_identity: ProviderIdentity) {
        self.ident = Some(provider_identity.ident());
        self.identity = None;
        self.provider_identity = Some(provider_identity);
    }

    pub(crate) fn set_identity(&mut self, identity: Identity) {
        self.ident = Some(identity.ident());
        self.identity = Some(identity);
    }
}
