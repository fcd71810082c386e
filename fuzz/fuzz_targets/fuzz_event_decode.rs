//! Fuzz target for event envelope decoding.
//!
//! Decoding arbitrary input must fail cleanly; anything that does decode
//! must survive checksum verification and re-encoding without panicking.

#![no_main]

use event_replication::Event;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let _ = Event::decode_verified(data);

    let Ok(mut event) = Event::decode(data) else {
        return;
    };

    let _ = event.verify_checksum();
    let _ = event.verb_for_prefix("entity");

    if event.seal().is_ok() {
        assert!(event.verify_checksum().is_ok());
    }
});
