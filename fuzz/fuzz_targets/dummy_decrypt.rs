#![no_main]

use libfuzzer_sys::fuzz_target;
use trezor_cipher_core::device::{CipherKeyValue, Wallet, DEFAULT_IV, DERIVATION_PATH};
use trezor_cipher_core::dummy::DummyWallet;

fuzz_target!(|data: &[u8]| {
    // Arbitrary ciphertext is answered with a value or an error.
    let mut wallet = DummyWallet::new();
    wallet.reset().expect("dummy reset");
    let request = CipherKeyValue {
        path: DERIVATION_PATH,
        encrypt: false,
        key_name: "fuzz",
        value: data,
        iv: &DEFAULT_IV,
        ask_on_encrypt: true,
        ask_on_decrypt: true,
    };
    let _ = wallet.cipher_key_value(&request);
});
