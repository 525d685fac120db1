#![no_main]
use libfuzzer_sys::fuzz_target;
use partner_gate::auth::carrier::{extract_from_location, is_logout_request, remove_param};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = extract_from_location(s);
        let _ = is_logout_request(s);
        let stripped = remove_param(s, "token");
        // `remove_param` returns a bare query; re-adding one `?` must not revive it.
        assert!(extract_from_location(&format!("?{stripped}")).is_none());
    }
});
