#![no_main]

use libfuzzer_sys::fuzz_target;

use offcache::manifest::Manifest;

fuzz_target!(|data: &[u8]| {
    let Ok(paths) = serde_json::from_slice::<Vec<String>>(data) else {
        return;
    };
    if let Ok(manifest) = Manifest::new(paths) {
        for path in manifest.paths() {
            assert!(manifest.contains(path));
        }
    }
});
