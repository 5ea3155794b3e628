#![ allow (non_snake_case, non_upper_case_globals) ]

use std::fs;
use std::ops::{Deref, Not};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use toml_edit::DocumentMut;

use tracing::warn;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{Layer, Registry, reload};
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::reload::Handle;
use tracing_subscriber::prelude::*;




# [ derive (Debug) ]
pub struct _Config {
    pub toml     : RwLock <Option <DocumentMut>>,
    pub default  : DocumentMut,
    pub path     : RwLock <Option <PathBuf>>,
    pub loglevel : RwLock <Option <Handle <LevelFilter, Registry>>>,
}


# [ derive (Debug, Clone) ]
pub struct Config ( Arc <_Config> );

impl Deref for Config {
    type Target = _Config;
    fn deref (&self) -> &_Config { &self.0 }
}




// first some module level helper functions ..
/// Returns the directory of the currently running executable
fn get_app_dir () -> Option<PathBuf> {
    std::env::current_exe().ok() .and_then (|p| p.parent() .map (|p| p.to_path_buf()))
}

/// Checks whether a path is writeable by the current user by attempting to open/create a file in write mode
fn is_writeable (path: &Path) -> bool {
    fs::OpenOptions::new().write(true).create(true).truncate(false).open(path).is_ok()
    // note that ^^ this is similar to 'touch' and will create an empty file if it doesnt exist
}




impl Config {

    pub const CONF_FILE_NAME : &'static str = "winbar.conf.toml";

    pub const WINBAR_VERSION : &'static str = env!("CARGO_PKG_VERSION");


    fn empty () -> Config {
        Config ( Arc::new ( _Config {
            toml    : RwLock::new (None),
            default : DocumentMut::from_str (include_str!("../winbar.conf.toml")).unwrap(),
            // ^^ our winbar.conf.toml is at root of project, the include_str macro will load the contents at compile time
            path     : RwLock::new (None),
            loglevel : RwLock::new (None),
        } ) )
    }

    pub fn new () -> Config {
        let conf = Config::empty();
        conf.load();
        conf
    }

    /// Builds a config pinned to an explicit file location (instead of the usual discovery)
    pub fn new_at (path: PathBuf) -> Config {
        let conf = Config::empty();
        *conf.path.write().unwrap() = Some(path);
        conf.load();
        conf
    }


    fn get_config_file (&self) -> Option<PathBuf> {
        if let Some(pinned) = self.path.read().unwrap().as_ref() {
            return Some (pinned.clone())
        }
        let app_dir_loc = get_app_dir() .map (|p| p.join(Self::CONF_FILE_NAME));
        if app_dir_loc.as_ref() .is_some_and (|p| is_writeable(p)) {
            return app_dir_loc
        }
        let bar_data_dir = dirs::data_local_dir() .map (|p| p.join("Winbar"));
        if bar_data_dir .as_ref() .is_some_and (|p| !p.exists()) {
            let _ = fs::create_dir (bar_data_dir.as_ref().unwrap());
        }
        let bar_data_dir_loc = bar_data_dir .map (|p| p.join(Self::CONF_FILE_NAME));
        if bar_data_dir_loc .as_ref() .is_some_and (|p| is_writeable(p)) {
            return bar_data_dir_loc
        }
        None
    }
    pub fn get_log_loc (&self) -> Option<PathBuf> {
        if let Some(conf_path) = self.get_config_file() {
            if let Some(conf_loc) = conf_path.parent() {
                return Some(conf_loc.to_path_buf())
        } }
        None
    }


    pub fn trigger_config_file_reset (&self) {
        self.toml.write().unwrap() .replace (self.default.clone());
        self.write_back_toml();
    }


    pub fn load (&self) {
        if let Some(conf_path) = self.get_config_file().as_ref() {
            if let Ok(cfg_str) = fs::read_to_string(conf_path) {
                if !cfg_str.trim().is_empty() {
                    if let Ok(toml) = DocumentMut::from_str(&cfg_str) {
                        // successfully read and parsed a writeable non-empty toml, we'll use that
                        self.toml.write().unwrap().replace(toml);
                        return
        }   }   }  }
        // there's no writeable location, or the file was empty, or we failed to read or parse it .. load default and write back
        self.trigger_config_file_reset();
    }

    pub fn reload_log_level (&self) {
        // we'll revisit log-subscriber setup in case there was a switch from disabled to enabled
        // (but note we still want to have the initial setup_log_subscriber called direct from main first to keep around the flush guard)
        let _ = self.setup_log_subscriber();
        let log_level = self.get_log_level();
        warn! ("Setting log-level to {:?}", log_level.into_level());
        self.loglevel.write().unwrap().as_ref() .map (|h| {
            h.modify (|f| *f = log_level)
        } );
    }

    pub fn setup_log_subscriber (&self) -> Result <WorkerGuard, ()> {

        if self.check_flag__logging_enabled().not() ||  self.loglevel.read().unwrap().is_some() {
            return Err(())
        }

        if let Some(log_loc) = self.get_log_loc() {

            let log_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("winbar_log")
                .filename_suffix("log")
                .max_log_files(7)
                .build(log_loc)
                .map_err (|_e| ())?;

            let (nb_log_appender, guard) = non_blocking (log_appender);

            let (level_filter, filter_handle) = reload::Layer::new(self.get_log_level());

            *self.loglevel.write().unwrap() = Some(filter_handle);

            let timer = LocalTime::new ( ::time::format_description::parse (
                "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
            ).unwrap() );

            let subscriber = tracing_subscriber::fmt::Layer::new()
                .with_writer(nb_log_appender)
                .with_timer(timer)
                .with_ansi(false)
                .with_filter(level_filter);

            tracing_subscriber::registry().with(subscriber).init();

            return Ok(guard)
        }
        Err(())
    }


    fn write_back_toml (&self) {
        let conf_path = self.get_config_file();
        if conf_path.is_none() { return }
        let _ = fs::write (
            conf_path.as_ref().unwrap(),
            self.toml.read().unwrap().as_ref() .map (|d| d.to_string()).unwrap_or_default()
        );
    }


    fn check_flag (&self, flag_name:&str) -> bool {
        self.toml.read().unwrap().as_ref()
            .and_then (|t| t.get(flag_name))
            .and_then (|t| t.as_bool())
            .unwrap_or (self.default.get(flag_name).unwrap().as_bool().unwrap())
    }

    fn get_number (&self, key:&str) -> u32 {
        self.toml.read().unwrap().as_ref()
            .and_then (|t| t.get(key))
            .and_then (|t| t.as_integer().map(|n| n as u32))
            .unwrap_or (self.default.get(key).unwrap().as_integer().unwrap() as u32)
    }

    fn get_string (&self, key:&str) -> String {
        self.toml.read().unwrap().as_ref()
            .and_then (|t| t.get(key))
            .and_then (|t| t.as_str()) .map (|s| s.to_string())
            .unwrap_or (self.default.get(key).unwrap().as_str().unwrap().to_string())
    }

    fn get_string_array (&self, key:&str) -> Vec<String> {
        self.toml.read().unwrap() .as_ref()
            .and_then (|t| t.get(key))
            .and_then (|t| t.as_array())
            .map (|t| t.iter() .filter_map (|v| v.as_str().map(|s| s.to_string())) .collect())
            .unwrap_or ( self.default.get(key).unwrap().as_array().unwrap().iter() .map (|v| v.as_str().unwrap().to_string()) .collect() )
    }



    // all the config flags we can check
    pub fn check_flag__tooltip_enabled         (&self) -> bool { self.check_flag ( "tooltip_enabled"         ) }
    pub fn check_flag__title_label_enabled     (&self) -> bool { self.check_flag ( "title_label_enabled"     ) }
    pub fn check_flag__track_iconless_windows  (&self) -> bool { self.check_flag ( "track_iconless_windows"  ) }
    pub fn check_flag__logging_enabled         (&self) -> bool { self.check_flag ( "logging_enabled"         ) }

    /// Title-change OS events are only worth subscribing to when something displays titles
    pub fn wants_name_change_events (&self) -> bool {
        self.check_flag__tooltip_enabled() || self.check_flag__title_label_enabled()
    }


    pub fn get_log_level (&self) -> LevelFilter {
        if !self.check_flag__logging_enabled() {
            return LevelFilter::OFF;
        }
        match self.get_string("logging_level").as_str() {
            "TRACE" => LevelFilter::TRACE,
            "DEBUG" => LevelFilter::DEBUG,
            "WARN"  => LevelFilter::WARN,
            "ERROR" => LevelFilter::ERROR,
            "OFF"   => LevelFilter::OFF,
            _       => LevelFilter::INFO,
        }
    }


    /// Base icon edge in px at 100% scaling (the cache rescales per monitor dpi)
    pub fn get_icon_size (&self) -> u32 {
        let size = self.get_number ("icon_size");
        if size > 0 { size } else { 16 }
        // ^^ zero would collapse every icon rasterization, so we floor at the default
    }

    pub fn get_title_max_length (&self) -> u32 { self.get_number ("title_max_length") }
    pub fn get_title_min_length (&self) -> u32 { self.get_number ("title_min_length") }

    pub fn get_title_show (&self) -> String { self.get_string ("title_show") }


    pub fn get_ignore_titles    (&self) -> Vec<String> { self.get_string_array ("ignore_titles")    }
    pub fn get_ignore_classes   (&self) -> Vec<String> { self.get_string_array ("ignore_classes")   }
    pub fn get_ignore_processes (&self) -> Vec<String> { self.get_string_array ("ignore_processes") }

}




#[ cfg (test) ]
mod tests {

    use super::*;

    #[test]
    fn defaults_apply_when_no_config_file_exists () {
        let dir = tempfile::tempdir().unwrap();
        let conf = Config::new_at (dir.path().join(Config::CONF_FILE_NAME));
        assert_eq! ( conf.get_icon_size(), 16 );
        assert_eq! ( conf.get_title_max_length(), 30 );
        assert!    ( conf.check_flag__tooltip_enabled() );
        assert!    ( ! conf.check_flag__track_iconless_windows() );
        // a missing file gets the defaults written back for the user to edit
        assert! ( dir.path().join(Config::CONF_FILE_NAME).exists() );
    }

    #[test]
    fn file_values_override_defaults () {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join(Config::CONF_FILE_NAME);
        std::fs::write (&conf_path, "icon_size = 24\ntitle_label_enabled = true\ntitle_show = \"focused\"\nlogging_level = \"DEBUG\"\n").unwrap();
        let conf = Config::new_at (conf_path);
        assert_eq! ( conf.get_icon_size(), 24 );
        assert!    ( conf.check_flag__title_label_enabled() );
        assert!    ( conf.wants_name_change_events() );
        assert_eq! ( conf.get_title_show(), "focused" );
        assert_eq! ( conf.get_log_level(), LevelFilter::DEBUG );
        // keys absent from the file still fall back to defaults
        assert_eq! ( conf.get_title_min_length(), 0 );
    }

    #[test]
    fn malformed_config_falls_back_to_defaults () {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join(Config::CONF_FILE_NAME);
        std::fs::write (&conf_path, "icon_size = [ this is not toml").unwrap();
        let conf = Config::new_at (conf_path);
        assert_eq! ( conf.get_icon_size(), 16 );
    }

    #[test]
    fn zero_icon_size_is_floored () {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join(Config::CONF_FILE_NAME);
        std::fs::write (&conf_path, "icon_size = 0\n").unwrap();
        let conf = Config::new_at (conf_path);
        assert_eq! ( conf.get_icon_size(), 16 );
    }

    #[test]
    fn logging_disabled_forces_level_off () {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join(Config::CONF_FILE_NAME);
        std::fs::write (&conf_path, "logging_enabled = false\nlogging_level = \"TRACE\"\n").unwrap();
        let conf = Config::new_at (conf_path);
        assert_eq! ( conf.get_log_level(), LevelFilter::OFF );
    }

}
