#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary TOML must never panic: bad input is a parse or validation
    // error, nothing more.
    match balancer_config::load_toml(data) {
        Ok(cfg) => {
            let _ = cfg.validate();
        }
        Err(_e) => {}
    }
});
