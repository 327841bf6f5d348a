/// The narrow view of an incoming request the core consumes.
///
/// Only header access and the peer address are assumed; the HTTP layer owns
/// everything else about request shape.
pub trait RequestContext {
    /// Returns the value of a request header, if present.
    fn header_value(&self, name: &str) -> Option<&str>;

    /// Returns the transport-level peer address.
    fn remote_address(&self) -> &str;
}

/// Extracts the client's real network address, honoring proxy headers.
///
/// Prefers the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// transport peer address.
pub fn real_ip(ctx: &dyn RequestContext) -> String {
    if let Some(forwarded) = ctx.header_value("X-Forwarded-For") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(ip) = ctx.header_value("X-Real-IP") {
        return ip.to_string();
    }
    ctx.remote_address().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeContext {
        headers: HashMap<&'static str, &'static str>,
        remote: &'static str,
    }

    impl RequestContext for FakeContext {
        fn header_value(&self, name: &str) -> Option<&str> {
            self.headers.get(name).copied()
        }

        fn remote_address(&self) -> &str {
            self.remote
        }
    }

    #[test]
    fn forwarded_for_takes_precedence() {
        let ctx = FakeContext {
            headers: HashMap::from([
                ("X-Forwarded-For", "203.0.113.9, 10.0.0.1"),
                ("X-Real-IP", "198.51.100.2"),
            ]),
            remote: "127.0.0.1:4242",
        };
        assert_eq!(real_ip(&ctx), "203.0.113.9");
    }

    #[test]
    fn real_ip_header_is_second_choice() {
        let ctx = FakeContext {
            headers: HashMap::from([("X-Real-IP", "198.51.100.2")]),
            remote: "127.0.0.1:4242",
        };
        assert_eq!(real_ip(&ctx), "198.51.100.2");
    }

    #[test]
    fn falls_back_to_remote_address() {
        let ctx = FakeContext {
            headers: HashMap::new(),
            remote: "127.0.0.1:4242",
        };
        assert_eq!(real_ip(&ctx), "127.0.0.1:4242");
    }
}
