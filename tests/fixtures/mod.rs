mod fixture_prefixbox;

pub use fixture_prefixbox::*;
