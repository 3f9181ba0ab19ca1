//! Cache key management utilities.
//!
//! Keys are `"{endpoint}"` or `"{endpoint}?{k1}={v1}&{k2}={v2}"` with params
//! sorted by name, so logically identical requests always share a key no
//! matter how their params were built.

use crate::config::BaseUrl;
use std::collections::BTreeMap;
use std::fmt;

/// Resource families whose mutation invalidates cached reads.
///
/// Matched as substrings of the endpoint, in this order.
pub const TRACKED_RESOURCES: &[&str] = &[
    "/institutes",
    "/classes",
    "/subjects",
    "/lectures",
    "/homework",
    "/exams",
    "/attendance",
    "/organizations",
    "/users",
    "/students",
    "/teachers",
    "/parents",
    "/results",
    "/submissions",
    "/enrollments",
    "/payments",
];

/// Flat request parameters with canonical ordering.
///
/// Values are normalized to strings on insertion; `None` values are skipped.
///
/// ```
/// use campus_kit::key::Params;
///
/// let a = Params::new().with("page", 1).with("instituteId", "I1");
/// let b = Params::new().with("instituteId", "I1").with("page", "1");
/// assert_eq!(a, b);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Params(BTreeMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.insert(name, value);
        self
    }

    /// Add the param only when `value` is `Some`.
    pub fn with_opt<V: fmt::Display>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.insert(name, value);
        }
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl fmt::Display) {
        self.0.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pairs in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: fmt::Display> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Builder for cache keys.
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Canonical key for an endpoint and its params.
    ///
    /// The endpoint is trimmed and stripped of trailing slashes.
    pub fn compute(endpoint: &str, params: &Params) -> String {
        let endpoint = Self::normalize_endpoint(endpoint);
        if params.is_empty() {
            return endpoint.to_string();
        }

        let query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
            .collect();
        format!("{}?{}", endpoint, query.join("&"))
    }

    /// Key prefixed with a namespace.
    pub fn build_with_prefix(prefix: &str, endpoint: &str, params: &Params) -> String {
        format!("{}:{}", prefix, Self::compute(endpoint, params))
    }

    /// Namespaced key for a request to `base`.
    ///
    /// The same path on the secondary origin is a different resource, so it
    /// gets its own `secondary:` segment.
    pub fn build_for_base(prefix: &str, base: BaseUrl, endpoint: &str, params: &Params) -> String {
        match base {
            BaseUrl::Primary => Self::build_with_prefix(prefix, endpoint, params),
            BaseUrl::Secondary => {
                format!("{}:secondary:{}", prefix, Self::compute(endpoint, params))
            }
        }
    }

    pub fn normalize_endpoint(endpoint: &str) -> &str {
        let trimmed = endpoint.trim();
        let stripped = trimmed.trim_end_matches('/');
        if stripped.is_empty() && trimmed.starts_with('/') {
            "/"
        } else {
            stripped
        }
    }

    /// First tracked resource family contained in `endpoint`.
    pub fn resource_family(endpoint: &str) -> Option<&'static str> {
        TRACKED_RESOURCES
            .iter()
            .copied()
            .find(|family| endpoint.contains(family))
    }

    /// Every tracked resource family contained in `endpoint`, as tags
    /// (leading slash removed).
    pub fn resource_tags(endpoint: &str) -> Vec<String> {
        TRACKED_RESOURCES
            .iter()
            .filter(|family| endpoint.contains(*family))
            .map(|family| family.trim_start_matches('/').to_string())
            .collect()
    }
}

// '&', '=' and '%' would make distinct param sets collide.
fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_without_params() {
        assert_eq!(CacheKeyBuilder::compute("/institutes/", &Params::new()), "/institutes");
        assert_eq!(CacheKeyBuilder::compute("/", &Params::new()), "/");
    }

    #[test]
    fn test_compute_is_order_independent() {
        let a = Params::new().with("classId", "C1").with("instituteId", "I1");
        let b = Params::new().with("instituteId", "I1").with("classId", "C1");
        assert_eq!(
            CacheKeyBuilder::compute("/homework", &a),
            "/homework?classId=C1&instituteId=I1"
        );
        assert_eq!(
            CacheKeyBuilder::compute("/homework", &a),
            CacheKeyBuilder::compute("/homework", &b)
        );
    }

    #[test]
    fn test_compute_escapes_separators() {
        let tricky = Params::new().with("a", "1&b=2");
        let plain = Params::new().with("a", 1).with("b", 2);
        assert_ne!(
            CacheKeyBuilder::compute("/exams", &tricky),
            CacheKeyBuilder::compute("/exams", &plain)
        );
    }

    #[test]
    fn test_with_opt_skips_none() {
        let params = Params::new()
            .with_opt("search", None::<&str>)
            .with_opt("page", Some(2));
        assert_eq!(params.get("search"), None);
        assert_eq!(params.get("page"), Some("2"));
    }

    #[test]
    fn test_build_with_prefix() {
        let key = CacheKeyBuilder::build_with_prefix(
            "campus",
            "/lectures",
            &Params::new().with("subjectId", "S1"),
        );
        assert_eq!(key, "campus:/lectures?subjectId=S1");
    }

    #[test]
    fn test_build_for_base_separates_origins() {
        let params = Params::new().with("page", 1);
        let primary =
            CacheKeyBuilder::build_for_base("campus", BaseUrl::Primary, "/organizations", &params);
        let secondary =
            CacheKeyBuilder::build_for_base("campus", BaseUrl::Secondary, "/organizations", &params);

        assert_eq!(primary, "campus:/organizations?page=1");
        assert_eq!(secondary, "campus:secondary:/organizations?page=1");
    }

    #[test]
    fn test_resource_family_and_tags() {
        assert_eq!(CacheKeyBuilder::resource_family("/homework/H1"), Some("/homework"));
        assert_eq!(CacheKeyBuilder::resource_family("/auth/me"), None);
        assert_eq!(
            CacheKeyBuilder::resource_tags("/institutes/I1/classes/C1/subjects"),
            vec!["institutes", "classes", "subjects"]
        );
    }
}
