pub mod dns;
pub mod http;
pub mod probe;
pub mod tls;
pub mod whois;
