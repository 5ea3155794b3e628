
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::config::Config;
use crate::winsys::WindowInfo;


/// System/shell classes that should never show up in a taskbar, regardless of user config ..
/// context menus, the native tray, composition host islands etc
static EXCLUDED_CLASSES : Lazy <HashSet <&'static str>> = Lazy::new ( || { HashSet::from ( [
    "Progman",
    "SysListView32",
    "XamlExplorerHostIslandWindow_WASDK",
    "Microsoft.UI.Content.PopupWindowSiteBridge",
    "Microsoft.UI.Content.DesktopChildSiteBridge",
    "Windows.UI.Composition.DesktopWindowContentBridge",
    "SysHeader32",
    "Windows.UI.Input.InputSite.WindowClass",
    "Shell_TrayWnd",
    "Shell_SecondaryTrayWnd",
    "#32768",
    "Qt673QWindowToolSaveBits",
    "Qt673QWindowToolTipSaveBits",
    "Qt673QWindowToolTipDropShadowSaveBits",
] ) } );


# [ derive (Debug, Default) ]
pub struct _ExclusionsManager {
    ignore_titles    : RwLock <HashSet <String>>,
    ignore_classes   : RwLock <HashSet <String>>,
    ignore_processes : RwLock <HashSet <String>>,
}

# [ derive (Debug, Clone) ]
pub struct ExclusionsManager ( Arc <_ExclusionsManager> );

impl Deref for ExclusionsManager {
    type Target = _ExclusionsManager;
    fn deref (&self) -> &_ExclusionsManager { &self.0 }
}


impl ExclusionsManager {

    pub fn new () -> ExclusionsManager {
        ExclusionsManager ( Arc::new ( _ExclusionsManager::default() ) )
    }

    /// (Re)loads the user-configured ignore lists .. called at startup and on config reload
    pub fn reload (&self, conf:&Config) {
        *self.ignore_titles    .write().unwrap() = conf.get_ignore_titles()    .into_iter().collect();
        *self.ignore_classes   .write().unwrap() = conf.get_ignore_classes()   .into_iter().collect();
        *self.ignore_processes .write().unwrap() = conf.get_ignore_processes() .into_iter().collect();
    }

    /// Whether a window should be tracked at all .. pure check over resolved metadata, and
    /// evaluated identically on the incremental and full-enumeration paths
    pub fn is_trackable (&self, info:&WindowInfo) -> bool {
        if info.title.is_empty() { return false }
        if EXCLUDED_CLASSES.contains (info.class_name.as_str()) { return false }
        if self.ignore_titles    .read().unwrap() .contains (&info.title)        { return false }
        if self.ignore_classes   .read().unwrap() .contains (&info.class_name)   { return false }
        if self.ignore_processes .read().unwrap() .contains (&info.process.name) { return false }
        true
    }

}




#[ cfg (test) ]
mod tests {

    use super::*;
    use crate::winsys::ProcessRef;

    fn info (title:&str, class_name:&str, proc_name:&str) -> WindowInfo {
        WindowInfo {
            title: title.into(), class_name: class_name.into(),
            process: ProcessRef { name: proc_name.into(), pid: 1234 },
        }
    }

    #[test]
    fn system_classes_are_never_trackable () {
        let em = ExclusionsManager::new();
        assert! ( ! em.is_trackable (&info ("Tray", "Shell_TrayWnd", "explorer.exe")) );
        assert! ( ! em.is_trackable (&info ("Menu", "#32768", "explorer.exe")) );
        assert! (   em.is_trackable (&info ("Editor", "Chrome_WidgetWin_1", "code.exe")) );
    }

    #[test]
    fn empty_titles_are_not_trackable () {
        let em = ExclusionsManager::new();
        assert! ( ! em.is_trackable (&info ("", "SomeClass", "some.exe")) );
    }

    #[test]
    fn configured_ignore_lists_apply () {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join("winbar.conf.toml");
        std::fs::write ( &conf_path, r#"
            ignore_titles    = ["Program Manager"]
            ignore_classes   = ["OleMainThreadWndClass"]
            ignore_processes = ["widgets.exe"]
        "# ).unwrap();
        let conf = Config::new_at (conf_path);

        let em = ExclusionsManager::new();
        em.reload (&conf);

        assert! ( ! em.is_trackable (&info ("Program Manager", "SomeClass", "some.exe")) );
        assert! ( ! em.is_trackable (&info ("Whatever", "OleMainThreadWndClass", "some.exe")) );
        assert! ( ! em.is_trackable (&info ("Whatever", "SomeClass", "widgets.exe")) );
        assert! (   em.is_trackable (&info ("Whatever", "SomeClass", "some.exe")) );
    }

}
