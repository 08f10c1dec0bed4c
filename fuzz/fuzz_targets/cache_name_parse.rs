#![no_main]

use libfuzzer_sys::fuzz_target;

use offcache::cache::CacheName;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    if let Some(name) = CacheName::parse(input) {
        // A parsed name must survive the round trip through its dir name.
        let dir_name = name.dir_name();
        assert_eq!(CacheName::parse(&dir_name), Some(name));
    }
});
