#![ allow (non_snake_case, non_upper_case_globals) ]

use std::ffi::c_void;
use std::mem::size_of;
use std::sync::{Arc, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::spawn;

use once_cell::sync::{Lazy, OnceCell};

use windows::core::PSTR;
use windows::Win32::Foundation::{BOOL, CloseHandle, HANDLE, HINSTANCE, HWND, LPARAM, WPARAM};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_CLOAKED};
use windows::Win32::Graphics::Gdi::{
    BITMAP, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, DeleteObject,
    GetDC, GetDIBits, GetObjectW, ReleaseDC,
};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameA, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::Accessibility::{HWINEVENTHOOK, SetWinEventHook};
use windows::Win32::UI::HiDpi::GetDpiForSystem;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassLongPtrW, GetClassNameW, GetForegroundWindow, GetIconInfo, GetMessageW,
    GetWindowLongW, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible, SendMessageW,
    EVENT_OBJECT_DESTROY, EVENT_OBJECT_FOCUS, EVENT_OBJECT_HIDE, EVENT_OBJECT_NAMECHANGE,
    EVENT_OBJECT_SHOW, EVENT_SYSTEM_FOREGROUND, GCLP_HICON, GCLP_HICONSM, GWL_EXSTYLE,
    HICON, ICONINFO, ICON_BIG, ICON_SMALL, ICON_SMALL2, MSG, WM_GETICON, WS_EX_TOOLWINDOW,
};

use crate::taskbar::Task;
use crate::winsys::{EventKind, Hwnd, ProcessRef, RawIcon, WindowInfo, WindowSystem};




fn hwnd_w (hwnd:Hwnd) -> HWND { HWND (hwnd as *mut c_void) }


pub fn check_window_visible (hwnd:Hwnd) -> bool { unsafe {
    IsWindowVisible (hwnd_w(hwnd)) .as_bool()
} }

pub fn check_window_cloaked (hwnd:Hwnd) -> bool { unsafe {
    let mut cloaked_state: isize = 0;
    let out_ptr = &mut cloaked_state as *mut isize as *mut c_void;
    let _ = DwmGetWindowAttribute (hwnd_w(hwnd), DWMWA_CLOAKED, out_ptr, size_of::<isize>() as u32);
    cloaked_state != 0
} }

pub fn check_if_tool_window (hwnd:Hwnd) -> bool { unsafe {
    GetWindowLongW (hwnd_w(hwnd), GWL_EXSTYLE) & WS_EX_TOOLWINDOW.0 as i32 != 0
} }

pub fn get_fgnd_window () -> Hwnd { unsafe {
    GetForegroundWindow().0 as Hwnd
} }


pub fn get_window_text (hwnd:Hwnd) -> String { unsafe {
    const MAX_LEN : usize = 512;
    let mut lpstr = [0u16; MAX_LEN];
    let copied_len = GetWindowTextW (hwnd_w(hwnd), &mut lpstr);
    String::from_utf16_lossy (&lpstr[..(copied_len as _)])
} }

pub fn get_window_class (hwnd:Hwnd) -> String { unsafe {
    const MAX_LEN : usize = 256;
    let mut lpstr = [0u16; MAX_LEN];
    let copied_len = GetClassNameW (hwnd_w(hwnd), &mut lpstr);
    String::from_utf16_lossy (&lpstr[..(copied_len as _)])
} }

pub fn get_hwnd_pid (hwnd:Hwnd) -> u32 { unsafe {
    let mut pid : u32 = 0;
    let _ = GetWindowThreadProcessId (hwnd_w(hwnd), Some(&mut pid));
    pid
} }

pub fn get_pid_exe_path (pid:u32) -> Option<String> { unsafe {
    const MAX_LEN : usize = 1024;
    let handle = OpenProcess (PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), pid);
    let mut lpstr = [0u8; MAX_LEN];
    let mut lpdwsize = MAX_LEN as u32;
    if handle.is_err() { return None }
    let _ = QueryFullProcessImageNameA ( HANDLE (handle.as_ref().unwrap().0), PROCESS_NAME_WIN32, PSTR::from_raw(lpstr.as_mut_ptr()), &mut lpdwsize );
    handle .iter() .for_each ( |h| { let _ = CloseHandle(*h); } );
    PSTR::from_raw (lpstr.as_mut_ptr()) .to_string() .ok()
} }

/// System dpi scaling as a factor of the 96-dpi baseline
pub fn get_display_scale () -> f32 { unsafe {
    GetDpiForSystem() as f32 / 96.0
} }




/*****  icon extraction  ******/

/// Asks the window for an icon handle .. WM_GETICON variants first, then the class icons
fn get_hicon (hwnd:Hwnd) -> Option<HICON> { unsafe {
    for which in [ICON_BIG, ICON_SMALL, ICON_SMALL2] {
        let res = SendMessageW (hwnd_w(hwnd), WM_GETICON, WPARAM (which as usize), LPARAM(0));
        if res.0 != 0 { return Some ( HICON (res.0 as *mut c_void) ) }
    }
    for which in [GCLP_HICON, GCLP_HICONSM] {
        let res = GetClassLongPtrW (hwnd_w(hwnd), which);
        if res != 0 { return Some ( HICON (res as *mut c_void) ) }
    }
    None
} }

/// Pulls 32-bit pixels out of an icon handle, swapping the gdi BGRA layout to RGBA ..
/// fully transparent bitmaps count as no icon (some apps hand those back for WM_GETICON)
fn extract_icon_pixels (hicon:HICON) -> Option<RawIcon> { unsafe {
    let mut icon_info = ICONINFO::default();
    GetIconInfo (hicon, &mut icon_info) .ok()?;
    if icon_info.hbmColor.is_invalid() {
        // monochrome cursor-style icon .. not worth rendering on a bar
        let _ = DeleteObject (icon_info.hbmMask);
        return None
    }

    let mut bmp = BITMAP::default();
    let got_bmp = GetObjectW ( icon_info.hbmColor, size_of::<BITMAP>() as i32, Some (&mut bmp as *mut BITMAP as *mut c_void) ) != 0;
    let (w, h) = (bmp.bmWidth, bmp.bmHeight);

    let mut result = None;
    if got_bmp && w > 0 && h > 0 {
        let mut bmi = BITMAPINFO::default();
        bmi.bmiHeader.biSize = size_of::<BITMAPINFOHEADER>() as u32;
        bmi.bmiHeader.biWidth = w;
        bmi.bmiHeader.biHeight = -h;   // negative height for top-down row order
        bmi.bmiHeader.biPlanes = 1;
        bmi.bmiHeader.biBitCount = 32;
        bmi.bmiHeader.biCompression = BI_RGB.0;

        let mut pixels = vec! [0u8; (w * h * 4) as usize];
        let hdc = GetDC (HWND::default());
        let copied = GetDIBits ( hdc, icon_info.hbmColor, 0, h as u32, Some (pixels.as_mut_ptr() as *mut c_void), &mut bmi, DIB_RGB_COLORS );
        ReleaseDC (HWND::default(), hdc);

        if copied == h {
            pixels .chunks_exact_mut (4) .for_each (|px| px.swap (0, 2));
            if pixels .chunks_exact (4) .any (|px| px[3] != 0) {
                result = Some ( RawIcon { width: w as u32, height: h as u32, rgba: pixels } );
            }
        }
    }
    let _ = DeleteObject (icon_info.hbmColor);
    let _ = DeleteObject (icon_info.hbmMask);
    result
} }

pub fn get_window_icon (hwnd:Hwnd) -> Option<RawIcon> {
    get_hicon (hwnd) .and_then (extract_icon_pixels)
}




/*****  window enumeration  ******/

// we'll use a static rwlocked vec to store enum results from callbacks, and a mutex to ensure only one enum call is active
static enum_windows_lock : Lazy <Arc <Mutex <()>>> = Lazy::new (|| Arc::new ( Mutex::new(())));
static enum_windows_acc  : Lazy <Arc <RwLock <Vec <Hwnd>>>> = Lazy::new (|| Arc::new ( RwLock::new (vec!()) ) );

pub fn get_top_level_windows () -> Vec<Hwnd> { unsafe {
    let lock = enum_windows_lock.lock().unwrap();
    enum_windows_acc.write().unwrap() .clear();
    let _ = EnumWindows ( Some(enum_windows_cb), LPARAM::default() );
    let windows = enum_windows_acc.read().unwrap().clone();
    drop(lock);
    windows
} }

unsafe extern "system" fn enum_windows_cb (hwnd:HWND, _:LPARAM) -> BOOL {
    let hwnd = hwnd.0 as Hwnd;
    if check_window_visible (hwnd) && !check_window_cloaked (hwnd) && !check_if_tool_window (hwnd) {
        enum_windows_acc.write().unwrap() .push (hwnd);
    }
    BOOL (true as i32)
}




/*****  the WindowSystem backend  ******/

pub struct Win32WindowSystem;

impl WindowSystem for Win32WindowSystem {

    fn enumerate_windows (&self) -> Vec<Hwnd> {
        get_top_level_windows()
    }

    fn window_info (&self, hwnd:Hwnd) -> Option<WindowInfo> {
        if !check_window_visible (hwnd) { return None }
        let pid = get_hwnd_pid (hwnd);
        let name = get_pid_exe_path (pid)
            .and_then (|p| p.rsplit (['\\','/']) .next() .map (|s| s.to_string()))?;
        Some ( WindowInfo {
            title      : get_window_text (hwnd),
            class_name : get_window_class (hwnd),
            process    : ProcessRef { name, pid },
        } )
    }

    fn foreground_window (&self) -> Hwnd {
        get_fgnd_window()
    }

    fn window_icon (&self, hwnd:Hwnd) -> Option<RawIcon> {
        get_window_icon (hwnd)
    }

    fn display_scale (&self) -> f32 {
        get_display_scale()
    }

}




/*****  OS event hooks  ******/

static event_hooks_tx : OnceCell <Sender<Task>> = OnceCell::new();
static watch_name_changes : AtomicBool = AtomicBool::new (false);

/// Installs win-event hooks feeding the engine's task channel and parks a message loop
/// thread for their callbacks .. title-change events are only hooked when asked for, as
/// they can be by far the noisiest stream
pub fn setup_win_event_hooks (tx: Sender<Task>, name_changes: bool) {
    if event_hooks_tx.set (tx) .is_err() { return }   // already installed
    watch_name_changes .store (name_changes, Ordering::SeqCst);

    spawn ( move || unsafe {
        /* Reference:
            pub unsafe fn SetWinEventHook (
                eventmin: u32, eventmax: u32, cb_dll: HINSTANCE, cb: WINEVENTPROC,
                idprocess: u32, idthread: u32, dwflags: u32
            ) -> HWINEVENTHOOK

            We'll split these into separate hooks because the (system and object) events are in separate ranges
                separating them this way avoids pointless calls for events that'd end up within the wider range of a single hook
                (esp considering there are events like 0x800B that can fire continuously on pointer motion!)

                0x03   : EVENT_SYSTEM_FOREGROUND
                0x8001 : EVENT_OBJECT_DESTROY
                0x8002 : EVENT_OBJECT_SHOW
                0x8003 : EVENT_OBJECT_HIDE
                0x8005 : EVENT_OBJECT_FOCUS
                0x800C : EVENT_OBJECT_NAMECHANGE
         */
        SetWinEventHook ( 0x0003, 0x0003, HINSTANCE::default(), Some(win_event_hook_cb), 0, 0, 0 );
        SetWinEventHook ( 0x8001, 0x8005, HINSTANCE::default(), Some(win_event_hook_cb), 0, 0, 0 );
        if watch_name_changes .load (Ordering::SeqCst) {
            SetWinEventHook ( 0x800C, 0x800C, HINSTANCE::default(), Some(win_event_hook_cb), 0, 0, 0 );
        }

        // win32 sends hook events to a thread with a 'message loop', but we wont create any windows here to get window messages,
        //     so we'll just leave a forever waiting GetMessage instead of setting up a msg-loop
        let mut msg: MSG = MSG::default();
        while BOOL(0) != GetMessageW (&mut msg, HWND::default(), 0, 0) { };
    } );
}

unsafe extern "system" fn win_event_hook_cb (
    _id_hook: HWINEVENTHOOK, event: u32, hwnd: HWND,
    id_object: i32, id_child: i32, _id_thread: u32, _event_time: u32
) {
    if id_object != 0 || id_child != 0 { return }
    let kind = match event {
        EVENT_SYSTEM_FOREGROUND  => EventKind::Foreground,
        EVENT_OBJECT_FOCUS       => EventKind::Focus,
        EVENT_OBJECT_SHOW        => EventKind::Focus,
        // ^^ a freshly shown window needs the same refresh a focus change does
        EVENT_OBJECT_HIDE        => EventKind::Hide,
        EVENT_OBJECT_NAMECHANGE  => EventKind::NameChange,
        EVENT_OBJECT_DESTROY     => EventKind::Destroy,
        _ => return,
    };
    event_hooks_tx .get() .iter() .for_each ( |tx| {
        let _ = tx.send ( Task::WinEvent { hwnd: hwnd.0 as Hwnd, event: kind } );
    } );
}
