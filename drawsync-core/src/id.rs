//! # IDs
//! The identifiers that flow through a session. Layer ids and sequence numbers are assigned by the shared
//! authoritative history and are therefore identical on every participant. Preview tokens are client-local,
//! allocated by a [`TokenAllocator`] and only meaningful when echoed back to the client that minted them.

/// Identity of a layer in the [`LayerStack`](crate::state::LayerStack).
///
/// Assigned monotonically by the stack and never reused within a session, so a stale id can
/// only ever fail to resolve, never alias a different layer.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerID(pub u32);

/// Identity of a participant, as assigned by the authoritative peer on login.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserID(pub u8);

/// Authoritative position of a command in the global order.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub u64);

/// Client-local handle tying outbound commands to their speculative preview.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct PreviewToken(std::num::NonZeroU64);

impl PreviewToken {
    /// Get the raw numeric value of this token.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
    /// Rebuild a token from a value echoed by the transport. Zero is never minted, and is rejected.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        std::num::NonZeroU64::new(raw).map(Self)
    }
}

/// Mints [`PreviewToken`]s, unique for the lifetime of the allocator.
///
/// Not a process-global. Each controller owns one.
pub struct TokenAllocator {
    next: std::num::NonZeroU64,
}
impl Default for TokenAllocator {
    fn default() -> Self {
        Self {
            next: std::num::NonZeroU64::MIN,
        }
    }
}
impl TokenAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// Allocate a fresh token.
    ///
    /// # Panics
    /// After 2^64 - 1 allocations. Not a concern in practice.
    pub fn allocate(&mut self) -> PreviewToken {
        let id = self.next;
        self.next = self
            .next
            .checked_add(1)
            .expect("preview token space exhausted");
        PreviewToken(id)
    }
}

macro_rules! display_as_tagged {
    ($($ty:ident => $tag:literal),* $(,)?) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, concat!($tag, "#{}"), self.0)
                }
            }
            impl std::fmt::Debug for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    <$ty as std::fmt::Display>::fmt(self, f)
                }
            }
        )*
    };
}
display_as_tagged! {
    LayerID => "Layer",
    UserID => "User",
    SeqNum => "Seq",
    PreviewToken => "Token",
}
