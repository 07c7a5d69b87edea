//! Basic authentication realms
//!
//! A realm protects a set of path prefixes with a set of credentials. The
//! realm owning the longest matching prefix decides access for a request.

use super::query::matches_segment_prefix;
use base64::{engine::general_purpose, Engine as _};

/// A named group of protected path prefixes sharing one credential set
#[derive(Debug, Clone, Default)]
pub struct Realm {
    name: String,
    prefixes: Vec<String>,
    credentials: Vec<(String, String)>,
}

impl Realm {
    pub fn new(name: impl Into<String>) -> Self {
        Realm {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protect another path prefix; duplicates are ignored
    pub fn add_prefix(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if !self.prefixes.contains(&prefix) {
            self.prefixes.push(prefix);
        }
    }

    /// Add a user, replacing the password of an existing one
    pub fn add_credential(&mut self, user: impl Into<String>, password: impl Into<String>) {
        let user = user.into();
        let password = password.into();
        match self.credentials.iter_mut().find(|(u, _)| *u == user) {
            Some(entry) => entry.1 = password,
            None => self.credentials.push((user, password)),
        }
    }

    /// Length of this realm's longest prefix protecting `path`
    fn longest_match(&self, path: &str) -> Option<usize> {
        self.prefixes
            .iter()
            .filter(|p| matches_segment_prefix(p, path))
            .map(String::len)
            .max()
    }

    fn accepts(&self, user: &str, password: &str) -> bool {
        self.credentials
            .iter()
            .any(|(u, p)| u == user && p == password)
    }
}

/// Outcome of checking a request against the realm table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// No realm protects the path
    Open,
    /// Valid credentials for the protecting realm
    Authenticated(String),
    /// Missing or wrong credentials; challenge with this realm name
    Challenge(String),
    /// An authentication scheme other than Basic was offered
    UnsupportedScheme,
}

/// Find the realm protecting `path` by longest prefix
pub fn find_realm<'a>(realms: &'a [Realm], path: &str) -> Option<&'a Realm> {
    realms
        .iter()
        .filter_map(|realm| realm.longest_match(path).map(|len| (len, realm)))
        .max_by_key(|(len, _)| *len)
        .map(|(_, realm)| realm)
}

/// Decide access to `path` given the request's `Authorization` header
pub fn authorize(realms: &[Realm], path: &str, authorization: Option<&str>) -> AuthOutcome {
    let Some(realm) = find_realm(realms, path) else {
        return AuthOutcome::Open;
    };

    let Some(header) = authorization else {
        return AuthOutcome::Challenge(realm.name.clone());
    };

    let Some(encoded) = header.strip_prefix("Basic ") else {
        return AuthOutcome::UnsupportedScheme;
    };

    match decode_basic(encoded.trim()) {
        Some((user, password)) if realm.accepts(&user, &password) => {
            AuthOutcome::Authenticated(user)
        }
        _ => AuthOutcome::Challenge(realm.name.clone()),
    }
}

/// `WWW-Authenticate` value challenging for `realm`
pub fn challenge(realm: &str) -> String {
    format!("Basic realm=\"{}\"", realm)
}

/// Decode a Basic credential into (user, password), split at the first `:`
pub fn decode_basic(encoded: &str) -> Option<(String, String)> {
    let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(user_pass: &str) -> String {
        format!("Basic {}", general_purpose::STANDARD.encode(user_pass))
    }

    fn realms() -> Vec<Realm> {
        let mut admin = Realm::new("admin");
        admin.add_prefix("/admin");
        admin.add_credential("root", "secret");

        let mut public = Realm::new("public");
        public.add_prefix("/admin/public");
        public.add_credential("guest", "guest");

        vec![admin, public]
    }

    #[test]
    fn test_longest_prefix_wins() {
        let realms = realms();
        assert_eq!(find_realm(&realms, "/admin/public/x").unwrap().name(), "public");
        assert_eq!(find_realm(&realms, "/admin/x").unwrap().name(), "admin");
        assert_eq!(find_realm(&realms, "/admin").unwrap().name(), "admin");
        assert!(find_realm(&realms, "/administrator").is_none());
        assert!(find_realm(&realms, "/").is_none());
    }

    #[test]
    fn test_open_path() {
        assert_eq!(authorize(&realms(), "/index.html", None), AuthOutcome::Open);
    }

    #[test]
    fn test_missing_header_challenges() {
        assert_eq!(
            authorize(&realms(), "/admin/x", None),
            AuthOutcome::Challenge("admin".to_string())
        );
        assert_eq!(challenge("admin"), "Basic realm=\"admin\"");
    }

    #[test]
    fn test_unsupported_scheme() {
        assert_eq!(
            authorize(&realms(), "/admin", Some("Bearer abc")),
            AuthOutcome::UnsupportedScheme
        );
    }

    #[test]
    fn test_credentials_checked_per_realm() {
        let realms = realms();
        assert_eq!(
            authorize(&realms, "/admin/x", Some(&basic("root:secret"))),
            AuthOutcome::Authenticated("root".to_string())
        );
        assert_eq!(
            authorize(&realms, "/admin/public/x", Some(&basic("root:secret"))),
            AuthOutcome::Challenge("public".to_string())
        );
        assert_eq!(
            authorize(&realms, "/admin/x", Some(&basic("root:wrong"))),
            AuthOutcome::Challenge("admin".to_string())
        );
        assert_eq!(
            authorize(&realms, "/admin/x", Some("Basic !!!notbase64")),
            AuthOutcome::Challenge("admin".to_string())
        );
    }

    #[test]
    fn test_password_may_contain_colon() {
        assert_eq!(
            decode_basic(&general_purpose::STANDARD.encode("u:p:q")),
            Some(("u".to_string(), "p:q".to_string()))
        );
        assert_eq!(decode_basic(&general_purpose::STANDARD.encode("nocolon")), None);
    }
}
