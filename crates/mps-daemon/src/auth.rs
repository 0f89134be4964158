//! HTTP basic authentication for the trigger endpoint.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Realm advertised in `WWW-Authenticate` on a 401.
pub const REALM: &str = "mps-daemon";

/// The single user/password pair the storefront presents.
#[derive(Clone)]
pub struct TriggerCredentials {
    user: String,
    password: String,
}

impl std::fmt::Debug for TriggerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerCredentials")
            .field("user", &self.user)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

impl TriggerCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// True if `header` (the raw `Authorization` value) carries this pair.
    pub fn verify(&self, header: Option<&str>) -> bool {
        match header.and_then(decode_basic) {
            Some((user, password)) => user == self.user && password == self.password,
            None => false,
        }
    }
}

/// `Basic <base64(user:password)>` -> `(user, password)`.
///
/// The scheme name is case-insensitive; the password may itself contain `:`.
pub fn decode_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let raw = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(raw).ok()?;
    let (user, password) = text.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Header value for a 401 response.
pub fn challenge() -> String {
    format!("Basic realm=\"{REALM}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(pair: &str) -> String {
        format!("Basic {}", STANDARD.encode(pair))
    }

    #[test]
    fn decodes_user_and_password() {
        assert_eq!(
            decode_basic(&header("shop:s3:cret")),
            Some(("shop".to_string(), "s3:cret".to_string()))
        );
        assert_eq!(
            decode_basic(&format!("basic {}", STANDARD.encode("a:b"))),
            Some(("a".to_string(), "b".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(decode_basic("Bearer abc"), None);
        assert_eq!(decode_basic("Basic !!!"), None);
        assert_eq!(decode_basic(&header("no-colon")), None);
        assert_eq!(decode_basic(""), None);
    }

    #[test]
    fn verify_matches_exact_pair() {
        let c = TriggerCredentials::new("shop", "pw");
        assert!(c.verify(Some(&header("shop:pw"))));
        assert!(!c.verify(Some(&header("shop:PW"))));
        assert!(!c.verify(None));
    }

    #[test]
    fn debug_hides_password() {
        let c = TriggerCredentials::new("shop", "pw-very-secret");
        assert!(!format!("{c:?}").contains("pw-very-secret"));
    }
}
