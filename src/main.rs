// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr (
    all ( not(debug_assertions), target_os = "windows" ),
    windows_subsystem = "windows"
)]

use winbar::config::Config;


fn main() {

    let conf = Config::new();

    // we want the non-blocking log-appender guard to be here in main, to ensure any pending logs get flushed upon crash etc
    let _guard = conf.setup_log_subscriber();

    tracing::info! ("Starting Winbar v{} ...", Config::WINBAR_VERSION);

    run_engine (conf);

}


#[ cfg (windows) ]
fn run_engine (conf: Config) {
    use std::sync::Arc;
    use winbar::taskbar::TaskbarState;
    use winbar::win_apis::{setup_win_event_hooks, Win32WindowSystem};

    let ts = TaskbarState::new ( Arc::new (Win32WindowSystem), conf );

    ts.set_on_changeset ( Box::new ( |cs| {
        // stand-in renderer .. downstream bar UIs subscribe here instead
        tracing::info! ("changeset: {}", serde_json::to_string(cs).unwrap_or_default());
    } ) );

    setup_win_event_hooks ( ts.sender(), ts.conf.wants_name_change_events() );

    ts.spawn_tool_version_probe ("whkd");

    ts.run();   // never returns .. the engine loop owns this thread
}

#[ cfg (not (windows)) ]
fn run_engine (_conf: Config) {
    tracing::error! ("no window-system backend for this platform .. exiting");
}
