use std::fmt;

/// A value whose provenance includes bytes controlled by the remote peer.
///
/// Everything read off the RPC channel is born wrapped in `Untrusted` and
/// stays wrapped until a verification step consumes it. The payload is only
/// reachable through methods whose names say what is happening, so a grep
/// for `unverified` finds every place raw remote data is touched. There is
/// deliberately no `Deref` and no `Display`.
#[must_use]
pub struct Untrusted<T>(T);

impl<T> Untrusted<T> {
    /// Wrap a value arriving from the remote peer.
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the unverified payload. Callers must be verification code.
    pub fn unverified(&self) -> &T {
        &self.0
    }

    /// Consume the wrapper and return the unverified payload.
    pub fn into_unverified(self) -> T {
        self.0
    }

    /// Transform the payload without changing its trust status.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Untrusted<U> {
        Untrusted(f(self.0))
    }
}

impl<T> fmt::Debug for Untrusted<T> {
    /// The payload is never printed; attacker-controlled bytes do not
    /// belong in logs or panic messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Untrusted(..)")
    }
}
