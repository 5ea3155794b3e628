
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, RwLock};
use std::sync::mpsc::Sender;
use std::thread::{sleep, spawn};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::Config;
use crate::taskbar::Task;
use crate::winsys::{Hwnd, ProcessRef, RawIcon, WindowSystem};


/// Host process known to lazily materialize its windows' icons .. worth a bounded retry
pub const SLOW_ICON_OWNER : &str = "ApplicationFrameHost.exe";

pub const ICON_RETRY_LIMIT : u32      = 10;
pub const ICON_RETRY_DELAY : Duration = Duration::from_millis (500);


/// Display scale folded to a hashable cache-key component (1.0 -> 100) .. a dpi change makes
/// new keys, so stale-scale entries are superseded rather than mutated
pub type ScaleKey = u32;

pub fn scale_key (scale:f32) -> ScaleKey {
    (scale * 100.0) .round() as ScaleKey
}


# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone) ]
pub struct IconCacheKey {
    pub hwnd  : Hwnd,
    pub pid   : u32,
    pub scale : ScaleKey,
}


# [ derive (Debug, Clone) ]
pub struct IconBitmap {
    pub width  : u32,
    pub height : u32,
    pub rgba   : Vec<u8>,
}

pub type IconHandle = Arc <IconBitmap>;


# [ derive (Debug, Clone) ]
/// Per-key resolution state machine : Unresolved(attempts-left) -> Resolved | Unavailable
enum IconState {
    Resolved    (IconHandle),
    Unresolved  { attempts_left : u32 },
    Unavailable,
}

# [ derive (Debug, Clone) ]
/// What a resolve attempt reports back to the diff pass
pub enum IconLookup {
    Resolved (IconHandle),
    Pending,
    Unavailable,
}


pub struct _IconsManager {
    cache  : RwLock <HashMap <IconCacheKey, IconState>>,
    winsys : Arc <dyn WindowSystem>,
    conf   : Config,
    tasks  : Sender <Task>,
}

# [ derive (Clone) ]
pub struct IconsManager ( Arc <_IconsManager> );

impl Deref for IconsManager {
    type Target = _IconsManager;
    fn deref (&self) -> &_IconsManager { &self.0 }
}


impl IconsManager {

    pub fn new (winsys: Arc<dyn WindowSystem>, conf: Config, tasks: Sender<Task>) -> IconsManager {
        IconsManager ( Arc::new ( _IconsManager {
            cache : RwLock::new (HashMap::new()),
            winsys, conf, tasks,
        } ) )
    }


    /// Main resolution entry, called from snapshot passes .. cached results short-circuit
    /// without any OS call, everything else goes through a (possibly deferred) provider attempt
    pub fn resolve (&self, hwnd:Hwnd, process:&ProcessRef, scale:f32) -> IconLookup {
        let key = IconCacheKey { hwnd, pid: process.pid, scale: scale_key(scale) };
        match self.cache.read().unwrap().get(&key) {
            Some (IconState::Resolved(h))     => { return IconLookup::Resolved (h.clone()) }
            Some (IconState::Unavailable)     => { return IconLookup::Unavailable }
            Some (IconState::Unresolved{..})  => { return IconLookup::Pending }
            // ^^ a retry is already scheduled for this key, nothing more to do this pass
            None => { }
        }
        self.attempt (key, &process.name)
    }

    fn attempt (&self, key:IconCacheKey, proc_name:&str) -> IconLookup {
        if let Some(raw) = self.winsys.window_icon (key.hwnd) {
            return match self.rasterize (raw, key.scale) {
                Some(h) => {
                    self.cache.write().unwrap() .insert (key, IconState::Resolved (h.clone()));
                    IconLookup::Resolved (h)
                }
                None => {
                    // provider handed back pixels we couldnt make sense of .. treat as permanent
                    self.cache.write().unwrap() .insert (key, IconState::Unavailable);
                    IconLookup::Unavailable
                }
            }
        }
        if proc_name == SLOW_ICON_OWNER {
            debug! ("no icon yet for slow-owner window {:?} .. scheduling retries", key.hwnd);
            self.cache.write().unwrap() .insert (key, IconState::Unresolved { attempts_left: ICON_RETRY_LIMIT });
            self.schedule_retry (key.hwnd, key.pid);
            return IconLookup::Pending
        }
        self.cache.write().unwrap() .insert (key, IconState::Unavailable);
        IconLookup::Unavailable
    }

    /// Handles a due retry task .. returns whether the icon resolved (so the engine can queue
    /// a rescan to surface the window). A retry whose key was evicted or already settled is
    /// simply abandoned
    pub fn process_retry (&self, hwnd:Hwnd, pid:u32) -> bool {
        let key = IconCacheKey { hwnd, pid, scale: scale_key (self.winsys.display_scale()) };
        let attempts_left = match self.cache.read().unwrap().get(&key) {
            Some (IconState::Unresolved {attempts_left}) => *attempts_left,
            _ => return false,
        };
        if let Some(raw) = self.winsys.window_icon (hwnd) {
            if let Some(h) = self.rasterize (raw, key.scale) {
                info! ("icon for window {:?} resolved after retry", hwnd);
                self.cache.write().unwrap() .insert (key, IconState::Resolved(h));
                return true
            }
        }
        if attempts_left <= 1 {
            debug! ("icon retry budget exhausted for window {:?} .. marking unavailable", hwnd);
            self.cache.write().unwrap() .insert (key, IconState::Unavailable);
        } else {
            self.cache.write().unwrap() .insert (key, IconState::Unresolved { attempts_left: attempts_left - 1 });
            self.schedule_retry (hwnd, pid);
        }
        false
    }

    fn schedule_retry (&self, hwnd:Hwnd, pid:u32) {
        let tasks = self.tasks.clone();
        spawn ( move || {
            sleep (ICON_RETRY_DELAY);
            let _ = tasks.send (Task::IconRetry {hwnd, pid});
        } );
    }


    fn rasterize (&self, raw:RawIcon, scale:ScaleKey) -> Option<IconHandle> {
        let img = image::RgbaImage::from_raw (raw.width, raw.height, raw.rgba)?;
        let px = ((self.conf.get_icon_size() * scale) as f32 / 100.0) .round() .max (1.0) as u32;
        let resized = image::imageops::resize (&img, px, px, image::imageops::FilterType::Lanczos3);
        Some ( Arc::new ( IconBitmap { width: px, height: px, rgba: resized.into_raw() } ) )
    }


    /// Drops all cache entries for a window once the registry drops it .. retries in flight
    /// for those keys then abandon themselves on arrival
    pub fn evict_window (&self, hwnd:Hwnd) {
        self.cache.write().unwrap() .retain (|k,_| k.hwnd != hwnd);
    }

    /// Clears the 'permanently unavailable' sentinels so a full refresh gives those windows a
    /// fresh retry budget .. resolved bitmaps are kept, those only turn over via new keys
    pub fn clear_unavailable (&self) {
        self.cache.write().unwrap() .retain (|_,st| !matches! (st, IconState::Unavailable));
    }

}




#[ cfg (test) ]
mod tests {

    use std::sync::mpsc;

    use super::*;
    use crate::winsys::test_support::MockWinSys;

    fn setup () -> (Arc<MockWinSys>, IconsManager, mpsc::Receiver<Task>) {
        let dir = tempfile::tempdir().unwrap();
        let conf = Config::new_at (dir.path().join("winbar.conf.toml"));
        let ws = Arc::new (MockWinSys::new());
        let (tx, rx) = mpsc::channel();
        let im = IconsManager::new (ws.clone(), conf, tx);
        (ws, im, rx)
    }

    fn proc_ref (name:&str, pid:u32) -> ProcessRef {
        ProcessRef { name: name.into(), pid }
    }

    #[test]
    fn resolved_icons_are_cached_and_rescaled () {
        let (ws, im, _rx) = setup();
        ws.add_window (11, "App", "C", "app.exe", 42, Some (MockWinSys::test_icon()));

        let lookup = im.resolve (11, &proc_ref("app.exe",42), 1.0);
        let h = match lookup { IconLookup::Resolved(h) => h, other => panic!("expected resolved, got {:?}", other) };
        // default icon_size is 16, at scale 1.0
        assert_eq! ( (h.width, h.height), (16, 16) );
        assert_eq! ( h.rgba.len(), 16*16*4 );

        // second resolve hits the cache, no further provider calls
        let calls = ws.icon_calls_for (11);
        let _ = im.resolve (11, &proc_ref("app.exe",42), 1.0);
        assert_eq! ( ws.icon_calls_for(11), calls );

        // a dpi change is a new key, so it re-resolves at the new size
        match im.resolve (11, &proc_ref("app.exe",42), 1.5) {
            IconLookup::Resolved(h) => assert_eq! ( (h.width, h.height), (24, 24) ),
            other => panic! ("expected resolved at new scale, got {:?}", other),
        }
    }

    #[test]
    fn non_slow_owner_without_icon_is_permanently_unavailable () {
        let (ws, im, _rx) = setup();
        ws.add_window (12, "App", "C", "plain.exe", 7, None);

        assert! ( matches! ( im.resolve (12, &proc_ref("plain.exe",7), 1.0), IconLookup::Unavailable ) );
        assert_eq! ( ws.icon_calls_for(12), 1 );
        // sentinel short-circuits later passes
        assert! ( matches! ( im.resolve (12, &proc_ref("plain.exe",7), 1.0), IconLookup::Unavailable ) );
        assert_eq! ( ws.icon_calls_for(12), 1 );
    }

    #[test]
    fn slow_owner_gets_exactly_bounded_retries () {
        let (ws, im, rx) = setup();
        ws.add_window (13, "Uwp", "C", SLOW_ICON_OWNER, 9, None);

        assert! ( matches! ( im.resolve (13, &proc_ref(SLOW_ICON_OWNER,9), 1.0), IconLookup::Pending ) );
        assert_eq! ( ws.icon_calls_for(13), 1 );

        // drive the retry state machine directly (the scheduled tasks would do this via the loop)
        for _ in 0..ICON_RETRY_LIMIT {
            assert! ( ! im.process_retry (13, 9) );
        }
        assert_eq! ( ws.icon_calls_for(13), 1 + ICON_RETRY_LIMIT );

        // budget exhausted .. key is a sentinel now, no further provider calls from any path
        assert! ( matches! ( im.resolve (13, &proc_ref(SLOW_ICON_OWNER,9), 1.0), IconLookup::Unavailable ) );
        assert! ( ! im.process_retry (13, 9) );
        assert_eq! ( ws.icon_calls_for(13), 1 + ICON_RETRY_LIMIT );

        // at least the first deferred retry should have been scheduled on the task channel
        assert! ( matches! ( rx.try_recv(), Ok (Task::IconRetry {hwnd:13, pid:9}) | Err(_) ) );
    }

    #[test]
    fn slow_owner_icon_appearing_mid_retries_resolves () {
        let (ws, im, _rx) = setup();
        ws.add_window (14, "Uwp", "C", SLOW_ICON_OWNER, 5, None);

        assert! ( matches! ( im.resolve (14, &proc_ref(SLOW_ICON_OWNER,5), 1.0), IconLookup::Pending ) );
        assert! ( ! im.process_retry (14, 5) );

        ws.set_icon (14, MockWinSys::test_icon());
        assert! ( im.process_retry (14, 5) );
        assert! ( matches! ( im.resolve (14, &proc_ref(SLOW_ICON_OWNER,5), 1.0), IconLookup::Resolved(_) ) );
    }

    #[test]
    fn eviction_drops_all_keys_for_a_window () {
        let (ws, im, _rx) = setup();
        ws.add_window (15, "App", "C", "app.exe", 3, Some (MockWinSys::test_icon()));

        let _ = im.resolve (15, &proc_ref("app.exe",3), 1.0);
        let _ = im.resolve (15, &proc_ref("app.exe",3), 2.0);
        im.evict_window (15);

        let calls = ws.icon_calls_for (15);
        let _ = im.resolve (15, &proc_ref("app.exe",3), 1.0);
        assert_eq! ( ws.icon_calls_for(15), calls + 1 );   // cache was cold again
    }

    #[test]
    fn clear_unavailable_restores_retry_chances () {
        let (ws, im, _rx) = setup();
        ws.add_window (16, "App", "C", "plain.exe", 8, None);

        assert! ( matches! ( im.resolve (16, &proc_ref("plain.exe",8), 1.0), IconLookup::Unavailable ) );
        ws.set_icon (16, MockWinSys::test_icon());
        // still sentineled ..
        assert! ( matches! ( im.resolve (16, &proc_ref("plain.exe",8), 1.0), IconLookup::Unavailable ) );
        // .. until a full refresh clears the sentinels
        im.clear_unavailable();
        assert! ( matches! ( im.resolve (16, &proc_ref("plain.exe",8), 1.0), IconLookup::Resolved(_) ) );
    }

}
