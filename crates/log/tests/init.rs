//! Global installation. One test per binary since the subscriber is global.

use regula_log::{Config, LogError, init_with, try_init};

#[test]
fn installs_once_and_reloads() {
    let config = Config {
        reloadable: true,
        ..Config::test()
    };
    let guard = init_with(config).expect("first install succeeds");
    let handle = guard.reload_handle().expect("reloadable config");
    assert_eq!(handle.current_filter().as_str(), "trace");

    handle.reload("warn,regula_engine=debug").unwrap();
    assert_eq!(handle.current_filter().as_str(), "warn,regula_engine=debug");
    tracing::debug!(target: "regula_engine", "visible after reload");

    let err = init_with(Config::test()).unwrap_err();
    assert!(matches!(err, LogError::AlreadyInitialized(_)));
    assert!(try_init(Config::test()).is_none());
}
