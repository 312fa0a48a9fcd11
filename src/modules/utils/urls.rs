/// Builds absolute links embedded in outgoing mail.
///
/// The account core only knows the route name and the code; how those map to
/// an absolute URL belongs to the web layer.
pub trait UrlBuilder: Send + Sync {
    fn build_verification_url(&self, code: &str) -> String;
}

/// Route name of the verification endpoint
pub const VERIFY_ROUTE: &str = "verify";

/// URL builder rooted at a fixed site address, e.g. `https://example.com`
pub struct BaseUrlBuilder {
    base_url: String,
}

impl BaseUrlBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl UrlBuilder for BaseUrlBuilder {
    fn build_verification_url(&self, code: &str) -> String {
        format!("{}/{}/{}/", self.base_url, VERIFY_ROUTE, code)
    }
}
