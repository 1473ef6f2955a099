use secrecy::{ExposeSecret, SecretString};

/// A hosting-platform or model-provider token.
///
/// The secret is redacted in `Debug` output and only exposed at the point
/// of use (clone/push URL, subprocess environment).
#[derive(Debug)]
pub struct Credential {
    secret: SecretString,
    /// Name of the resolver strategy that produced it.
    pub source: &'static str,
}

impl Credential {
    pub fn new(token: impl Into<String>, source: &'static str) -> Self {
        Self {
            secret: SecretString::from(token.into()),
            source,
        }
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_owned(), self.source)
    }
}

/// Rewrite an https URL so it carries the token as basic-auth userinfo.
/// Non-https URLs are returned unchanged; existing userinfo is replaced.
pub fn authenticated_url(url: &str, credential: &Credential) -> String {
    let Some(rest) = url.strip_prefix("https://") else {
        return url.to_string();
    };
    let rest = match rest.split_once('/') {
        Some((authority, path)) => {
            let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
            format!("{host}/{path}")
        }
        None => rest.rsplit_once('@').map_or(rest, |(_, h)| h).to_string(),
    };
    format!("https://x-access-token:{}@{rest}", credential.expose())
}

/// Remove any userinfo from a URL.
pub fn strip_credentials(url: &str) -> String {
    for scheme in ["https://", "http://"] {
        if let Some(rest) = url.strip_prefix(scheme) {
            let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
            let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
            return if path.is_empty() && !rest.contains('/') {
                format!("{scheme}{host}")
            } else {
                format!("{scheme}{host}/{path}")
            };
        }
    }
    url.to_string()
}
