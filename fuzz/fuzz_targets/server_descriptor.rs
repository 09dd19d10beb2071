//! Fuzz test for server descriptor parsing
//!
//! Tests that arbitrary `host[:port]` strings never panic and that accepted
//! descriptors survive a Display/FromStr round trip.

#![no_main]

use libfuzzer_sys::fuzz_target;
use natprobe_discovery::ServerDescriptor;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(server) = s.parse::<ServerDescriptor>() {
            let reparsed: ServerDescriptor = server
                .to_string()
                .parse()
                .expect("displayed descriptor parses");
            assert_eq!(reparsed, server);
        }
    }
});
