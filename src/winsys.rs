#![ allow (non_snake_case) ]

use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;


/// Opaque OS handle to a top-level window .. primary key everywhere in the tracking engine
pub type Hwnd = isize;


# [ derive (Debug, Eq, PartialEq, Hash, Copy, Clone, AsRefStr, Serialize, Deserialize) ]
#[serde(rename_all = "snake_case")]
/// The window-lifecycle notifications the engine consumes from the OS event hook
pub enum EventKind {
    Foreground,
    Focus,
    Hide,
    NameChange,
    Destroy,
}


# [ derive (Debug, Default, Eq, PartialEq, Hash, Clone, Serialize, Deserialize) ]
pub struct ProcessRef {
    pub name : String,
    pub pid  : u32,
}

# [ derive (Debug, Default, Eq, PartialEq, Hash, Clone, Serialize, Deserialize) ]
/// Per-window metadata resolved on demand .. a window that cant resolve this is not trackable
pub struct WindowInfo {
    pub title      : String,
    pub class_name : String,
    pub process    : ProcessRef,
}


# [ derive (Debug, Clone) ]
/// Un-scaled RGBA pixels as handed back by the OS icon provider
pub struct RawIcon {
    pub width  : u32,
    pub height : u32,
    pub rgba   : Vec<u8>,
}


/// The narrow interface the engine consumes the OS through .. the win32 backend implements
/// this for real, and tests drive the engine through a scripted mock
pub trait WindowSystem : Send + Sync {

    /// Full enumeration of visible, titled, non-tool-window top-levels (pre exclusion-filtering)
    fn enumerate_windows (&self) -> Vec<Hwnd>;

    /// Title/class/process lookup .. None means the window vanished or metadata is unavailable
    fn window_info (&self, hwnd:Hwnd) -> Option<WindowInfo>;

    fn foreground_window (&self) -> Hwnd;

    /// Icon bitmap for a window .. None covers both 'not yet' and 'never' (the resolver
    /// decides which, based on the owning process)
    fn window_icon (&self, hwnd:Hwnd) -> Option<RawIcon>;

    /// Per-monitor display scaling factor (1.0 at 96 dpi)
    fn display_scale (&self) -> f32;

}




#[ cfg (test) ]
pub(crate) mod test_support {

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicIsize, Ordering};

    use super::*;

    /// Scripted WindowSystem for engine tests .. windows are listed in insertion order
    pub struct MockWinSys {
        pub windows    : Mutex <Vec <Hwnd>>,
        pub infos      : Mutex <HashMap <Hwnd, WindowInfo>>,
        pub icons      : Mutex <HashMap <Hwnd, RawIcon>>,
        pub fgnd       : AtomicIsize,
        pub scale      : Mutex <f32>,
        pub icon_calls : Mutex <HashMap <Hwnd, u32>>,
    }

    impl MockWinSys {

        pub fn new () -> MockWinSys { MockWinSys {
            windows    : Mutex::new (Vec::new()),
            infos      : Mutex::new (HashMap::new()),
            icons      : Mutex::new (HashMap::new()),
            fgnd       : AtomicIsize::new (0),
            scale      : Mutex::new (1.0),
            icon_calls : Mutex::new (HashMap::new()),
        } }

        pub fn test_icon () -> RawIcon {
            RawIcon { width: 2, height: 2, rgba: vec![0xFF; 2*2*4] }
        }

        pub fn add_window (&self, hwnd:Hwnd, title:&str, class_name:&str, proc_name:&str, pid:u32, icon:Option<RawIcon>) {
            self.windows.lock().unwrap().push(hwnd);
            self.infos.lock().unwrap().insert (hwnd, WindowInfo {
                title: title.into(), class_name: class_name.into(),
                process: ProcessRef { name: proc_name.into(), pid },
            });
            if let Some(ico) = icon { self.icons.lock().unwrap().insert (hwnd, ico); }
        }
        pub fn remove_window (&self, hwnd:Hwnd) {
            self.windows.lock().unwrap().retain (|h| *h != hwnd);
            self.infos.lock().unwrap().remove(&hwnd);
            self.icons.lock().unwrap().remove(&hwnd);
        }
        pub fn set_title (&self, hwnd:Hwnd, title:&str) {
            self.infos.lock().unwrap().get_mut(&hwnd) .map (|wi| wi.title = title.into());
        }
        pub fn set_icon (&self, hwnd:Hwnd, icon:RawIcon) {
            self.icons.lock().unwrap().insert (hwnd, icon);
        }
        pub fn set_fgnd (&self, hwnd:Hwnd) {
            self.fgnd.store (hwnd, Ordering::SeqCst);
        }
        pub fn icon_calls_for (&self, hwnd:Hwnd) -> u32 {
            self.icon_calls.lock().unwrap().get(&hwnd).copied().unwrap_or(0)
        }
    }

    impl WindowSystem for MockWinSys {
        fn enumerate_windows (&self) -> Vec<Hwnd> {
            self.windows.lock().unwrap().clone()
        }
        fn window_info (&self, hwnd:Hwnd) -> Option<WindowInfo> {
            self.infos.lock().unwrap().get(&hwnd).cloned()
        }
        fn foreground_window (&self) -> Hwnd {
            self.fgnd.load (Ordering::SeqCst)
        }
        fn window_icon (&self, hwnd:Hwnd) -> Option<RawIcon> {
            *self.icon_calls.lock().unwrap().entry(hwnd).or_insert(0) += 1;
            self.icons.lock().unwrap().get(&hwnd).cloned()
        }
        fn display_scale (&self) -> f32 {
            *self.scale.lock().unwrap()
        }
    }

}
