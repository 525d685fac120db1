#![no_main]
use libfuzzer_sys::fuzz_target;
use partner_gate::security::{decrypt, CipherError, EncodedBlob};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Arbitrary input fails with an input error, never a panic.
        match decrypt(&EncodedBlob::from(s), "fuzz-passphrase") {
            Ok(_) => {}
            Err(CipherError::MalformedInput(_) | CipherError::AuthenticationFailure) => {}
            Err(e) => panic!("unexpected cipher error: {e}"),
        }
    }
});
