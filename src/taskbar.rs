#![ allow (non_camel_case_types) ]
#![ allow (non_upper_case_globals) ]

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::{Arc, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{sleep, spawn};
use std::time::{Duration, Instant};

use atomic_enum::atomic_enum;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::exclusions::ExclusionsManager;
use crate::icons::{IconHandle, IconLookup, IconsManager};
use crate::winsys::{EventKind, Hwnd, ProcessRef, WindowInfo, WindowSystem};


/// Quiet interval inside which repeat notifications for the same (window, event-kind) are dropped
pub const DEBOUNCE_INTERVAL : Duration = Duration::from_millis (100);




# [ derive (Debug, Default, Clone) ]
/// pure sugar for representation of our atomic-bool flags
pub struct Flag (Arc <AtomicBool>);

impl Flag {
    pub fn new (state:bool) -> Flag { Flag ( Arc::new ( AtomicBool::new(state) ) ) }

    pub fn set   (&self) { self.0 .store (true,  Ordering::SeqCst) }
    pub fn clear (&self) { self.0 .store (false, Ordering::SeqCst) }

    pub fn check    (&self) -> bool { self.0 .load (Ordering::SeqCst) }
    pub fn is_set   (&self) -> bool { true  == self.0 .load (Ordering::SeqCst) }
    pub fn is_clear (&self) -> bool { false == self.0 .load (Ordering::SeqCst) }
}


# [ atomic_enum ]
# [ derive (PartialEq) ]
/// Light rescans just re-diff the world .. Full additionally clears no-icon sentinels so
/// those windows get a fresh resolution budget
pub enum ScanKind { Light, Full }
// ^^ the atomic_enum crate will generate an AtomicScanKind for us

pub struct ScanKind_A (AtomicScanKind);

impl ScanKind_A {
    pub fn new () -> ScanKind_A {
        ScanKind_A ( AtomicScanKind::new (ScanKind::Light) )
    }
    pub fn get (&self) -> ScanKind {
        self.0 .load (Ordering::SeqCst)
    }
    pub fn set (&self, kind: ScanKind) {
        self.0 .store (kind, Ordering::SeqCst);
    }
    pub fn is_light (&self) -> bool {
        self.0 .load (Ordering::SeqCst) == ScanKind::Light
    }
}




/// Everything the engine loop processes .. OS notifications and all deferred work arrive
/// here so state only ever mutates on the loop thread
pub enum Task {
    WinEvent    { hwnd: Hwnd, event: EventKind },
    Rescan,
    IconRetry   { hwnd: Hwnd, pid: u32 },
    ToolVersion { tool: String, version: Option<String> },
}




# [ derive (Debug, Clone, Serialize) ]
/// A window the registry currently considers relevant .. created only once its icon question
/// is settled, destroyed when it drops out of a snapshot
pub struct TrackedWindow {
    pub hwnd    : Hwnd,
    pub title   : String,
    #[serde(skip)]
    pub icon    : Option <IconHandle>,
    pub process : ProcessRef,
}

# [ derive (Debug, Default, Clone, Serialize) ]
/// Minimal diff between two snapshots .. the engine's sole output contract.
/// added/renamed preserve snapshot order; a hwnd appears in at most one membership bucket
pub struct ChangeSet {
    pub added              : Vec <TrackedWindow>,
    pub removed            : Vec <Hwnd>,
    pub renamed            : Vec <(Hwnd, String)>,
    pub foreground_changed : Option <Hwnd>,
}

impl ChangeSet {
    pub fn is_noop (&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.renamed.is_empty() && self.foreground_changed.is_none()
    }
}


struct SnapshotEntry {
    hwnd : Hwnd,
    info : WindowInfo,
    icon : IconLookup,
}




pub struct Debouncer {
    last_seen : HashMap <(Hwnd, EventKind), Instant>,
}

impl Debouncer {

    pub fn new () -> Debouncer {
        Debouncer { last_seen: HashMap::new() }
    }

    /// Records and passes the first notification per (window, event-kind), suppresses repeats
    /// arriving inside the quiet interval .. no side effects beyond the timestamp table
    pub fn should_process (&mut self, hwnd:Hwnd, event:EventKind, now:Instant) -> bool {
        let key = (hwnd, event);
        if let Some(last) = self.last_seen.get(&key) {
            if now.duration_since(*last) < DEBOUNCE_INTERVAL { return false }
        }
        self.last_seen.insert (key, now);
        true
    }

    /// Dropped windows dont need their timestamps around .. keeps the table from growing
    /// unbounded over long sessions
    pub fn forget (&mut self, hwnd:Hwnd) {
        self.last_seen.retain (|(h,_),_| *h != hwnd);
    }

}




/// Formats a window title per max/min length settings .. truncation appends "..", short
/// titles get right-padded with spaces. A zero max-length means unbounded
pub fn format_title (title:&str, max_length:usize, min_length:usize) -> String {
    let mut formatted = if max_length > 0 && title.chars().count() > max_length {
        title.chars().take(max_length).collect::<String>() + ".."
    } else {
        title.to_string()
    };
    while formatted.chars().count() < min_length { formatted.push(' ') }
    formatted
}




pub struct _TaskbarState {

    pub winsys  : Arc <dyn WindowSystem>,
    pub conf    : Config,
    pub excl_m  : ExclusionsManager,
    pub icons_m : IconsManager,

    registry    : RwLock <HashMap <Hwnd, TrackedWindow>>,
    title_cache : RwLock <HashMap <Hwnd, String>>,
    debouncer   : RwLock <Debouncer>,

    last_fgnd    : AtomicIsize,
    tool_version : RwLock <Option <String>>,

    tasks   : Sender <Task>,
    task_rx : Mutex <Option <Receiver <Task>>>,

    rescan_pending   : Flag,
    queued_scan_kind : ScanKind_A,

    on_changeset : RwLock <Option <Box <dyn Fn (&ChangeSet) + Send + Sync>>>,

}

# [ derive (Clone) ]
pub struct TaskbarState ( Arc <_TaskbarState> );

impl Deref for TaskbarState {
    type Target = _TaskbarState;
    fn deref (&self) -> &Self::Target { &self.0 }
}




impl TaskbarState {

    pub fn new (winsys: Arc<dyn WindowSystem>, conf: Config) -> TaskbarState {
        let (tx, rx) = mpsc::channel();
        let icons_m = IconsManager::new (winsys.clone(), conf.clone(), tx.clone());
        let excl_m = ExclusionsManager::new();
        excl_m.reload (&conf);
        TaskbarState ( Arc::new ( _TaskbarState {
            winsys, conf, excl_m, icons_m,

            registry    : RwLock::new (HashMap::new()),
            title_cache : RwLock::new (HashMap::new()),
            debouncer   : RwLock::new (Debouncer::new()),

            last_fgnd    : AtomicIsize::default(),
            tool_version : RwLock::new (None),

            tasks   : tx,
            task_rx : Mutex::new (Some(rx)),

            rescan_pending   : Flag::default(),
            queued_scan_kind : ScanKind_A::new(),

            on_changeset : RwLock::new (None),
        } ) )
    }

    /// Handle for the event gateway (the OS hook posts raw notifications through this)
    pub fn sender (&self) -> Sender<Task> {
        self.tasks.clone()
    }

    /// Registers the renderer callback .. invoked once per processed pass with the diff
    pub fn set_on_changeset (&self, cb: Box <dyn Fn (&ChangeSet) + Send + Sync>) {
        *self.on_changeset.write().unwrap() = Some(cb);
    }

    /// Title formatting per current config, exposed so the renderer formats consistently
    /// with what the engine cached
    pub fn format_title (&self, title:&str) -> String {
        format_title (title, self.conf.get_title_max_length() as usize, self.conf.get_title_min_length() as usize)
    }

    pub fn tool_version (&self) -> Option<String> {
        self.tool_version.read().unwrap().clone()
    }

    pub fn last_foreground (&self) -> Hwnd {
        self.last_fgnd.load (Ordering::SeqCst)
    }




    /*****  the single-threaded engine loop  ******/

    /// Drains the task channel forever .. every diff pass commits fully before the next task.
    /// Call once; the receiver is consumed
    pub fn run (&self) {
        let rx = self.task_rx.lock().unwrap().take();
        let Some(rx) = rx else {
            warn! ("engine loop already running .. ignoring second run request");
            return
        };
        // startup pass so the bar isnt empty until the first event trickles in
        self.run_update_pass (ScanKind::Full);
        while let Ok(task) = rx.recv() {
            self.process_task (task);
        }
    }

    pub fn process_task (&self, task:Task) {
        match task {
            Task::WinEvent {hwnd, event} => { self.process_win_event (hwnd, event) }
            Task::Rescan => {
                let kind = self.queued_scan_kind.get();
                self.queued_scan_kind.set (ScanKind::Light);
                self.run_update_pass (kind);
            }
            Task::IconRetry {hwnd, pid} => {
                if self.icons_m.process_retry (hwnd, pid) {
                    self.trigger_rescan_queued (ScanKind::Light);
                }
            }
            Task::ToolVersion {tool, version} => {
                info! ("{} version probe returned {:?}", tool, version);
                *self.tool_version.write().unwrap() = version;
            }
        }
    }




    /*****  incoming OS notifications  ******/

    fn process_win_event (&self, hwnd:Hwnd, event:EventKind) {
        if ! self.debouncer.write().unwrap() .should_process (hwnd, event, Instant::now()) {
            return   // burst repeat inside the quiet interval
        }
        debug! ("win-event {} for {:?}", event.as_ref(), hwnd);

        let info = self.winsys.window_info (hwnd);
        let trackable = info.as_ref() .map (|wi| self.excl_m.is_trackable(wi)) .unwrap_or (false);
        if !trackable {
            // a tracked window vanishing (or turning untrackable) still needs a pass so the
            // diff can report its removal .. anything else we can ignore outright
            if self.registry.read().unwrap() .contains_key (&hwnd) {
                self.run_update_pass (ScanKind::Light);
            }
            return
        }
        let info = info.unwrap();   // trackable implies present

        let cached_title = self.title_cache.read().unwrap() .get(&hwnd) .cloned();
        if self.conf.wants_name_change_events() {
            // title-change cascades from eg IDEs fire without the title actually changing
            if event == EventKind::NameChange && cached_title.as_deref() == Some(info.title.as_str()) {
                return
            }
        }

        if cached_title.as_deref() != Some(info.title.as_str()) || event != EventKind::Foreground {
            self.title_cache.write().unwrap() .insert (hwnd, info.title.clone());
            self.run_update_pass (ScanKind::Light);
        }
    }




    /*****  snapshot enumeration and diffing  ******/

    /// Builds and applies a fresh snapshot, emitting the resulting change-set .. the MAY-rerun
    /// escape hatch for suspected-stale state is just calling this with Full
    pub fn run_update_pass (&self, kind:ScanKind) -> ChangeSet {
        if kind == ScanKind::Full {
            self.icons_m.clear_unavailable();
        }
        let snapshot = self.build_snapshot();
        let cs = self.apply_snapshot (snapshot);
        self.emit_changeset (&cs);
        cs
    }

    fn build_snapshot (&self) -> Vec<SnapshotEntry> {
        let scale = self.winsys.display_scale();
        let mut snap = Vec::new();
        for hwnd in self.winsys.enumerate_windows() {
            let Some(info) = self.winsys.window_info (hwnd) else { continue };
            // ^^ vanished mid-enumeration .. simply absent, not an error
            if ! self.excl_m.is_trackable (&info) { continue }
            let icon = self.icons_m.resolve (hwnd, &info.process, scale);
            snap.push ( SnapshotEntry { hwnd, info, icon } );
        }
        snap
    }

    /// The diff pass .. the registry is the single source of truth and only mutates here.
    /// O(existing + new) via hash lookups
    fn apply_snapshot (&self, snapshot: Vec<SnapshotEntry>) -> ChangeSet {
        let mut cs = ChangeSet::default();
        let mut registry = self.registry.write().unwrap();

        let snap_ids : HashSet<Hwnd> = snapshot.iter() .map (|se| se.hwnd) .collect();
        let gone : Vec<Hwnd> = registry.keys() .copied() .filter (|h| !snap_ids.contains(h)) .collect();
        for hwnd in gone {
            registry.remove (&hwnd);
            self.title_cache.write().unwrap() .remove (&hwnd);
            self.debouncer.write().unwrap() .forget (hwnd);
            self.icons_m.evict_window (hwnd);
            cs.removed.push (hwnd);
        }

        for se in snapshot {
            if let Some(tw) = registry.get_mut (&se.hwnd) {
                if tw.title != se.info.title {
                    tw.title = se.info.title.clone();
                    cs.renamed.push ( (se.hwnd, se.info.title) );
                }
            } else {
                let icon = match se.icon {
                    IconLookup::Resolved (h) => Some(h),
                    IconLookup::Pending => continue,
                    // ^^ will surface via `added` on a later pass once resolution settles
                    IconLookup::Unavailable => {
                        if ! self.conf.check_flag__track_iconless_windows() { continue }
                        None   // tracked title-only
                    }
                };
                let tw = TrackedWindow { hwnd: se.hwnd, title: se.info.title, icon, process: se.info.process };
                registry.insert (se.hwnd, tw.clone());
                cs.added.push (tw);
            }
        }
        drop (registry);

        // foreground restyling rides along without affecting membership
        let fgnd = self.winsys.foreground_window();
        if self.last_fgnd.swap (fgnd, Ordering::SeqCst) != fgnd {
            cs.foreground_changed = Some(fgnd);
        }
        cs
    }

    fn emit_changeset (&self, cs:&ChangeSet) {
        if cs.is_noop() { return }     // settled .. nothing for the renderer
        debug! ("changeset: {}", serde_json::to_string(cs).unwrap_or_default());
        self.on_changeset.read().unwrap() .iter() .for_each (|cb| cb(cs));
    }




    /*****  deferred work  ******/

    /// Coalesces rescan requests behind a short delay to absorb bunched-up trains of events ..
    /// any queued caller asking for Full upgrades the pending scan
    pub fn trigger_rescan_queued (&self, kind:ScanKind) {
        if kind == ScanKind::Full { self.queued_scan_kind.set (ScanKind::Full) }
        if self.rescan_pending.is_set() { return }
        self.rescan_pending.set();
        let ts = self.clone();
        let delay = if self.queued_scan_kind.is_light() {20} else {100};
        spawn ( move || {
            sleep (Duration::from_millis (delay));
            ts.rescan_pending.clear();
            let _ = ts.tasks.send (Task::Rescan);
        } );
    }

    /// Reloads config-driven state (ignore lists, labels) and queues a full refresh
    pub fn reload_config (&self) {
        self.conf.load();
        self.conf.reload_log_level();
        self.excl_m.reload (&self.conf);
        self.trigger_rescan_queued (ScanKind::Full);
    }

    /// One-shot background probe for an external tool's version (eg the keybind-hints daemon) ..
    /// the exec can block for seconds, so it runs off-thread and reports back as a task
    pub fn spawn_tool_version_probe (&self, tool:&str) {
        let tasks = self.tasks.clone();
        let tool = tool.to_string();
        spawn ( move || {
            let version = std::process::Command::new (&tool) .arg ("--version") .output() .ok()
                .filter (|out| out.status.success())
                .and_then (|out| String::from_utf8 (out.stdout) .ok())
                .map (|s| s.trim().to_string())
                .filter (|s| !s.is_empty());
            let _ = tasks.send (Task::ToolVersion {tool, version});
        } );
    }

}




#[ cfg (test) ]
mod tests {

    use super::*;
    use crate::icons::SLOW_ICON_OWNER;
    use crate::winsys::test_support::MockWinSys;

    fn setup () -> (Arc<MockWinSys>, TaskbarState) {
        let dir = tempfile::tempdir().unwrap();
        let conf = Config::new_at (dir.path().join("winbar.conf.toml"));
        let ws = Arc::new (MockWinSys::new());
        let ts = TaskbarState::new (ws.clone(), conf);
        (ws, ts)
    }
    fn setup_with_conf (conf_toml:&str) -> (Arc<MockWinSys>, TaskbarState) {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join("winbar.conf.toml");
        std::fs::write (&conf_path, conf_toml).unwrap();
        let conf = Config::new_at (conf_path);
        let ws = Arc::new (MockWinSys::new());
        let ts = TaskbarState::new (ws.clone(), conf);
        (ws, ts)
    }

    fn added_ids (cs:&ChangeSet) -> Vec<Hwnd> {
        cs.added.iter() .map (|tw| tw.hwnd) .collect()
    }


    #[test]
    fn debounce_suppresses_bursts_but_not_spaced_repeats () {
        let mut db = Debouncer::new();
        let t0 = Instant::now();
        assert! (   db.should_process (1, EventKind::Focus, t0) );
        assert! ( ! db.should_process (1, EventKind::Focus, t0 + Duration::from_millis(50)) );
        assert! (   db.should_process (1, EventKind::Focus, t0 + Duration::from_millis(50) + Duration::from_millis(150)) );
        // different event kinds debounce independently
        assert! (   db.should_process (1, EventKind::Hide, t0 + Duration::from_millis(10)) );
    }

    #[test]
    fn title_formatting () {
        assert_eq! ( format_title ("A very long window title", 10, 0), "A very lon.." );
        assert_eq! ( format_title ("hi", 0, 5), "hi   " );
        assert_eq! ( format_title ("exact", 5, 0), "exact" );
        assert_eq! ( format_title ("short", 10, 3), "short" );
    }

    #[test]
    fn snapshot_diff_is_idempotent () {
        let (ws, ts) = setup();
        ws.add_window (1, "One", "C1", "one.exe", 10, Some (MockWinSys::test_icon()));
        ws.add_window (2, "Two", "C2", "two.exe", 20, Some (MockWinSys::test_icon()));

        let cs = ts.run_update_pass (ScanKind::Light);
        assert_eq! ( added_ids(&cs), vec![1, 2] );

        let cs = ts.run_update_pass (ScanKind::Light);
        assert! ( cs.is_noop() );
    }

    #[test]
    fn diff_reports_added_removed_renamed_disjointly () {
        let (ws, ts) = setup();
        ws.add_window (1, "One", "C1", "one.exe", 10, Some (MockWinSys::test_icon()));
        ws.add_window (2, "Two", "C2", "two.exe", 20, Some (MockWinSys::test_icon()));
        let _ = ts.run_update_pass (ScanKind::Light);

        ws.remove_window (1);
        ws.set_title (2, "Two (renamed)");
        ws.add_window (3, "Three", "C3", "three.exe", 30, Some (MockWinSys::test_icon()));

        let cs = ts.run_update_pass (ScanKind::Light);
        assert_eq! ( added_ids(&cs), vec![3] );
        assert_eq! ( cs.removed, vec![1] );
        assert_eq! ( cs.renamed, vec![ (2, "Two (renamed)".to_string()) ] );

        // membership buckets are disjoint
        let mut seen = HashSet::new();
        for h in added_ids(&cs) .into_iter()
            .chain (cs.removed.iter().copied())
            .chain (cs.renamed.iter().map(|(h,_)| *h))
        {
            assert! ( seen.insert(h), "hwnd {h} appeared in more than one bucket" );
        }
    }

    #[test]
    fn excluded_windows_never_reach_a_changeset () {
        let (ws, ts) = setup();
        ws.add_window (1, "Tray", "Shell_TrayWnd", "explorer.exe", 10, Some (MockWinSys::test_icon()));
        ws.add_window (2, "App", "C2", "app.exe", 20, Some (MockWinSys::test_icon()));

        let cs = ts.run_update_pass (ScanKind::Light);
        assert_eq! ( added_ids(&cs), vec![2] );

        // the incremental event path filters identically
        ts.process_task ( Task::WinEvent { hwnd: 1, event: EventKind::Foreground } );
        assert! ( ! ts.registry.read().unwrap() .contains_key (&1) );
    }

    #[test]
    fn pending_icon_defers_membership_until_resolved () {
        let (ws, ts) = setup();
        ws.add_window (1, "One", "C1", "one.exe", 10, Some (MockWinSys::test_icon()));
        ws.add_window (2, "Uwp", "C2", SLOW_ICON_OWNER, 20, None);

        let cs = ts.run_update_pass (ScanKind::Light);
        assert_eq! ( added_ids(&cs), vec![1] );

        // icon shows up and a retry lands .. the next pass over the unchanged snapshot adds W2
        ws.set_icon (2, MockWinSys::test_icon());
        assert! ( ts.icons_m.process_retry (2, 20) );
        let cs = ts.run_update_pass (ScanKind::Light);
        assert_eq! ( added_ids(&cs), vec![2] );
    }

    #[test]
    fn foreground_switch_restyles_without_membership_change () {
        let (ws, ts) = setup();
        ws.add_window (1, "One", "C1", "one.exe", 10, Some (MockWinSys::test_icon()));
        ws.add_window (2, "Two", "C2", "two.exe", 20, Some (MockWinSys::test_icon()));
        ws.set_fgnd (1);
        let _ = ts.run_update_pass (ScanKind::Light);

        ws.set_fgnd (2);
        ts.process_task ( Task::WinEvent { hwnd: 2, event: EventKind::Focus } );

        assert_eq! ( ts.last_foreground(), 2 );
        let cs = ts.run_update_pass (ScanKind::Light);   // settled again
        assert! ( cs.is_noop() );
    }

    #[test]
    fn vanished_window_is_removed_via_event_path () {
        let (ws, ts) = setup();
        ws.add_window (1, "One", "C1", "one.exe", 10, Some (MockWinSys::test_icon()));
        let _ = ts.run_update_pass (ScanKind::Light);
        assert! ( ts.registry.read().unwrap() .contains_key (&1) );

        ws.remove_window (1);
        ts.process_task ( Task::WinEvent { hwnd: 1, event: EventKind::Destroy } );
        assert! ( ! ts.registry.read().unwrap() .contains_key (&1) );
        assert! ( ts.title_cache.read().unwrap() .is_empty() );
    }

    #[test]
    fn iconless_windows_tracked_title_only_when_configured () {
        let (ws, ts) = setup_with_conf ("track_iconless_windows = true\n");
        ws.add_window (1, "Bare", "C1", "bare.exe", 10, None);

        let cs = ts.run_update_pass (ScanKind::Light);
        assert_eq! ( added_ids(&cs), vec![1] );
        assert! ( cs.added[0].icon.is_none() );
    }

    #[test]
    fn unchanged_title_name_change_is_dropped () {
        let (ws, ts) = setup_with_conf ("title_label_enabled = true\n");
        let seen : Arc <Mutex <Vec<ChangeSet>>> = Arc::new (Mutex::new (Vec::new()));
        let seen_c = seen.clone();
        ts.set_on_changeset ( Box::new ( move |cs| seen_c.lock().unwrap().push (cs.clone()) ) );

        ws.add_window (1, "Doc - Editor", "C1", "edit.exe", 10, Some (MockWinSys::test_icon()));
        ts.process_task ( Task::WinEvent { hwnd: 1, event: EventKind::Focus } );
        assert_eq! ( seen.lock().unwrap().len(), 1 );   // primes the title cache too

        // title-change cascades that dont actually change the title get dropped outright
        ts.process_task ( Task::WinEvent { hwnd: 1, event: EventKind::NameChange } );
        assert_eq! ( seen.lock().unwrap().len(), 1 );

        // a real title change still flows through as a rename
        ws.set_title (1, "Other Doc - Editor");
        ts.debouncer.write().unwrap() .forget (1);
        ts.process_task ( Task::WinEvent { hwnd: 1, event: EventKind::NameChange } );

        let seen = seen.lock().unwrap();
        assert_eq! ( seen.len(), 2 );
        assert_eq! ( seen[1].renamed, vec![ (1, "Other Doc - Editor".to_string()) ] );
    }

    #[test]
    fn config_reload_refreshes_ignore_lists () {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join("winbar.conf.toml");
        std::fs::write (&conf_path, "logging_enabled = false\n").unwrap();
        let conf = Config::new_at (conf_path.clone());
        let ws = Arc::new (MockWinSys::new());
        let ts = TaskbarState::new (ws.clone(), conf);

        ws.add_window (1, "One", "C1", "one.exe", 10, Some (MockWinSys::test_icon()));
        ws.add_window (2, "Two", "C2", "two.exe", 20, Some (MockWinSys::test_icon()));
        let cs = ts.run_update_pass (ScanKind::Light);
        assert_eq! ( added_ids(&cs), vec![1, 2] );

        std::fs::write (&conf_path, "logging_enabled = false\nignore_processes = [\"two.exe\"]\n").unwrap();
        ts.reload_config();

        let cs = ts.run_update_pass (ScanKind::Full);
        assert_eq! ( cs.removed, vec![2] );
        assert! ( ! ts.registry.read().unwrap() .contains_key (&2) );
    }

    #[test]
    fn changesets_reach_the_registered_callback () {
        let (ws, ts) = setup();
        let seen : Arc <Mutex <Vec<ChangeSet>>> = Arc::new (Mutex::new (Vec::new()));
        let seen_c = seen.clone();
        ts.set_on_changeset ( Box::new ( move |cs| seen_c.lock().unwrap().push (cs.clone()) ) );

        ws.add_window (1, "One", "C1", "one.exe", 10, Some (MockWinSys::test_icon()));
        ts.process_task ( Task::WinEvent { hwnd: 1, event: EventKind::Foreground } );

        let seen = seen.lock().unwrap();
        assert_eq! ( seen.len(), 1 );
        assert_eq! ( added_ids (&seen[0]), vec![1] );
    }

    #[test]
    fn tool_version_task_is_recorded () {
        let (_ws, ts) = setup();
        ts.process_task ( Task::ToolVersion { tool: "whkd".into(), version: Some("whkd 0.2.7".into()) } );
        assert_eq! ( ts.tool_version(), Some("whkd 0.2.7".to_string()) );
    }

}
