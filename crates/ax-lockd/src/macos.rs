//! Quartz event tap and AppKit overlay
//!
//! The tap runs on its own thread with its own run loop and consults the
//! filter synchronously for every event. The overlay windows are owned by
//! [`OverlayHost`], which must run on the main thread.

use crate::constants::RUN_LOOP_SLICE_MS;
use crate::filter::{InputEvent, Verdict, quartz_event_mask};
use crate::hook::{HookError, InputInterceptor, SharedFilter};
use crate::overlay::OverlayCommand;
use cocoa::appkit::{NSApplication, NSApplicationActivationPolicyAccessory};
use cocoa::base::{NO, YES, id, nil};
use cocoa::foundation::{NSPoint, NSRect, NSString};
use core_foundation_sys::base::{CFRelease, CFTypeRef, kCFAllocatorDefault};
use core_foundation_sys::mach_port::{CFMachPortCreateRunLoopSource, CFMachPortInvalidate, CFMachPortRef};
use core_foundation_sys::runloop::{
    CFRunLoopAddSource, CFRunLoopGetCurrent, CFRunLoopRemoveSource, CFRunLoopRunInMode, CFRunLoopStop,
    kCFRunLoopCommonModes, kCFRunLoopDefaultMode,
};
use core_graphics::event::CGEventTapLocation;
use objc::{class, msg_send, sel, sel_impl};
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Instant;

const HEAD_INSERT_EVENT_TAP: u32 = 0;
const TAP_OPTION_DEFAULT: u32 = 0;
const TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
const TAP_DISABLED_BY_USER_INPUT: u32 = 0xFFFF_FFFF;

const FIELD_KEYBOARD_KEYCODE: u32 = 9;
const FIELD_SOURCE_USER_DATA: u32 = 42;

const BORDERLESS_WINDOW_MASK: u64 = 0;
const BACKING_STORE_BUFFERED: u64 = 2;
/// NSScreenSaverWindowLevel
const OVERLAY_WINDOW_LEVEL: i64 = 1000;
/// canJoinAllSpaces | stationary | fullScreenAuxiliary
const OVERLAY_COLLECTION_BEHAVIOR: u64 = 1 | 16 | 256;
const OVERLAY_TINT_ALPHA: f64 = 0.35;
const HEADLINE_FONT_SIZE: f64 = 28.0;
const STATUS_FONT_SIZE: f64 = 18.0;
const LABEL_SPACING: f64 = 12.0;

type TapCallback = extern "C" fn(*mut c_void, u32, *mut c_void, *mut c_void) -> *mut c_void;

#[link(name = "CoreGraphics", kind = "framework")]
unsafe extern "C" {
    fn CGEventTapCreate(
        tap: CGEventTapLocation,
        place: u32,
        options: u32,
        events_of_interest: u64,
        callback: TapCallback,
        user_info: *mut c_void,
    ) -> CFMachPortRef;

    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);

    fn CGEventGetIntegerValueField(event: *mut c_void, field: u32) -> i64;
}

/// State the tap callback reaches through its user info pointer
struct TapContext {
    filter: SharedFilter,
    tap: AtomicPtr<c_void>,
}

extern "C" fn tap_callback(
    _proxy: *mut c_void,
    event_type: u32,
    event: *mut c_void,
    user_info: *mut c_void,
) -> *mut c_void {
    // SAFETY: user_info is the TapContext created by run_tap, which frees it
    // only after the tap has been invalidated
    let context = unsafe { &*(user_info as *const TapContext) };

    if event_type == TAP_DISABLED_BY_TIMEOUT || event_type == TAP_DISABLED_BY_USER_INPUT {
        let tap = context.tap.load(Ordering::Acquire);
        if !tap.is_null() {
            tracing::warn!("event tap disabled by the system, re-enabling");
            // SAFETY: the tap outlives every callback it delivers
            unsafe { CGEventTapEnable(tap.cast(), true) };
        }
        return event;
    }

    // SAFETY: event is the live CGEventRef passed to this callback
    let (source_user_data, keycode) = unsafe {
        (
            CGEventGetIntegerValueField(event, FIELD_SOURCE_USER_DATA),
            CGEventGetIntegerValueField(event, FIELD_KEYBOARD_KEYCODE),
        )
    };
    let Some(input) = InputEvent::from_quartz(event_type, source_user_data, keycode) else {
        return event;
    };

    match context.filter.lock().decide(&input, Instant::now()) {
        Verdict::Forward => event,
        Verdict::Discard => ptr::null_mut(),
    }
}

/// Lets another thread end the tap thread's run loop
struct TapStop {
    requested: AtomicBool,
    run_loop: AtomicPtr<c_void>,
}

struct TapWorker {
    stop: Arc<TapStop>,
    thread: JoinHandle<()>,
}

/// Session-level event tap that swallows every event the filter discards
#[derive(Default)]
pub struct EventTapInterceptor {
    worker: Option<TapWorker>,
}

impl EventTapInterceptor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputInterceptor for EventTapInterceptor {
    fn install(&mut self, filter: SharedFilter) -> Result<(), HookError> {
        if self.worker.is_some() {
            return Err(HookError::Install("event tap already installed".to_string()));
        }

        let stop = Arc::new(TapStop {
            requested: AtomicBool::new(false),
            run_loop: AtomicPtr::new(ptr::null_mut()),
        });
        let (ready, installed) = mpsc::sync_channel(1);
        let thread = thread::Builder::new()
            .name("axlockd-event-tap".to_string())
            .spawn({
                let stop = stop.clone();
                move || run_tap(filter, stop, ready)
            })
            .map_err(|e| HookError::Install(format!("cannot start event tap thread: {}", e)))?;

        match installed.recv() {
            Ok(Ok(())) => {
                self.worker = Some(TapWorker { stop, thread });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(HookError::Install("event tap thread exited during setup".to_string()))
            }
        }
    }

    fn uninstall(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        worker.stop.requested.store(true, Ordering::Release);
        let run_loop = worker.stop.run_loop.load(Ordering::Acquire);
        if !run_loop.is_null() {
            // SAFETY: the run loop belongs to the tap thread, which lives until joined below
            unsafe { CFRunLoopStop(run_loop.cast()) };
        }
        if worker.thread.join().is_err() {
            tracing::warn!("event tap thread panicked");
        }
    }
}

impl Drop for EventTapInterceptor {
    fn drop(&mut self) {
        self.uninstall();
    }
}

/// Body of the tap thread: create, serve until asked to stop, tear down
fn run_tap(filter: SharedFilter, stop: Arc<TapStop>, ready: mpsc::SyncSender<Result<(), HookError>>) {
    let context = Box::into_raw(Box::new(TapContext {
        filter,
        tap: AtomicPtr::new(ptr::null_mut()),
    }));

    // SAFETY: the context stays valid until the tap is invalidated at the end of this function
    let tap = unsafe {
        CGEventTapCreate(
            CGEventTapLocation::Session,
            HEAD_INSERT_EVENT_TAP,
            TAP_OPTION_DEFAULT,
            quartz_event_mask(),
            tap_callback,
            context.cast(),
        )
    };
    if tap.is_null() {
        // SAFETY: no tap exists, so nothing else refers to the context
        drop(unsafe { Box::from_raw(context) });
        let _ = ready.send(Err(HookError::PermissionDenied));
        return;
    }
    // SAFETY: context is a live allocation owned by this thread
    unsafe { (*context).tap.store(tap.cast(), Ordering::Release) };

    // SAFETY: tap is a valid mach port created above
    let source = unsafe { CFMachPortCreateRunLoopSource(kCFAllocatorDefault, tap, 0) };
    if source.is_null() {
        // SAFETY: tap is valid and unused; the context is freed after it is invalidated
        unsafe {
            CFMachPortInvalidate(tap);
            CFRelease(tap as CFTypeRef);
            drop(Box::from_raw(context));
        }
        let _ = ready.send(Err(HookError::Install(
            "cannot create a run loop source for the event tap".to_string(),
        )));
        return;
    }

    // SAFETY: source and tap are valid; the run loop is this thread's own
    unsafe {
        let run_loop = CFRunLoopGetCurrent();
        stop.run_loop.store(run_loop.cast(), Ordering::Release);
        CFRunLoopAddSource(run_loop, source, kCFRunLoopCommonModes);
        CGEventTapEnable(tap, true);
    }
    let _ = ready.send(Ok(()));
    tracing::info!("event tap installed");

    let slice = RUN_LOOP_SLICE_MS as f64 / 1000.0;
    while !stop.requested.load(Ordering::Acquire) {
        // SAFETY: runs this thread's run loop in the default mode
        unsafe { CFRunLoopRunInMode(kCFRunLoopDefaultMode, slice, 0) };
    }

    // SAFETY: tear down in reverse order; no callback can run once the tap is invalidated
    unsafe {
        CGEventTapEnable(tap, false);
        CFRunLoopRemoveSource(CFRunLoopGetCurrent(), source, kCFRunLoopCommonModes);
        CFMachPortInvalidate(tap);
        CFRelease(source as CFTypeRef);
        CFRelease(tap as CFTypeRef);
        drop(Box::from_raw(context));
    }
    tracing::info!("event tap removed");
}

/// One display's tinted window with its two text lines
struct Panel {
    window: id,
    headline: id,
    status: id,
}

/// Main-thread owner of the overlay windows, one per display
///
/// Holds raw AppKit pointers and so never leaves the thread that created it.
pub struct OverlayHost {
    commands: mpsc::Receiver<OverlayCommand>,
    panels: Vec<Panel>,
}

impl OverlayHost {
    pub fn new(commands: mpsc::Receiver<OverlayCommand>) -> Self {
        Self {
            commands,
            panels: Vec::new(),
        }
    }

    /// Serve overlay commands until every sender is gone
    ///
    /// Must be called on the main thread.
    pub fn run(mut self) {
        // SAFETY: AppKit setup on the main thread
        unsafe {
            let app = NSApplication::sharedApplication(nil);
            app.setActivationPolicy_(NSApplicationActivationPolicyAccessory);
            let _: () = msg_send![app, finishLaunching];
        }

        let slice = RUN_LOOP_SLICE_MS as f64 / 1000.0;
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(mpsc::TryRecvError::Empty) => {
                    // SAFETY: spins the main run loop so AppKit can draw
                    unsafe { CFRunLoopRunInMode(kCFRunLoopDefaultMode, slice, 1) };
                }
                Err(mpsc::TryRecvError::Disconnected) => break,
            }
        }
        self.close_panels();
    }

    fn apply(&mut self, command: OverlayCommand) {
        // SAFETY: AppKit calls on the main thread inside a local autorelease pool
        unsafe {
            let pool: id = msg_send![class!(NSAutoreleasePool), new];
            match command {
                OverlayCommand::Show { message, reply } => {
                    if self.panels.is_empty() {
                        self.panels = open_panels(&message);
                        tracing::info!(displays = self.panels.len(), "overlay shown");
                    }
                    let _ = reply.send(self.panels.first().map(|panel| window_number(panel.window)));
                }
                OverlayCommand::Status(text) => {
                    for panel in &self.panels {
                        set_text(panel.status, &text);
                        layout(panel);
                    }
                }
                OverlayCommand::Close => self.close_panels(),
            }
            let _: () = msg_send![pool, drain];
        }
    }

    fn close_panels(&mut self) {
        for panel in self.panels.drain(..) {
            // SAFETY: the window was created by open_panel and is released exactly once here
            unsafe {
                let _: () = msg_send![panel.window, orderOut: nil];
                let _: () = msg_send![panel.window, close];
                let _: () = msg_send![panel.window, release];
            }
        }
    }
}

unsafe fn window_number(window: id) -> u64 {
    let number: i64 = unsafe { msg_send![window, windowNumber] };
    number as u64
}

unsafe fn ns_string(text: &str) -> id {
    unsafe {
        let string = NSString::alloc(nil).init_str(text);
        msg_send![string, autorelease]
    }
}

unsafe fn set_text(label: id, text: &str) {
    unsafe {
        let _: () = msg_send![label, setStringValue: ns_string(text)];
    }
}

unsafe fn open_panels(message: &str) -> Vec<Panel> {
    unsafe {
        let screens: id = msg_send![class!(NSScreen), screens];
        let count: usize = msg_send![screens, count];
        (0..count)
            .map(|i| {
                let screen: id = msg_send![screens, objectAtIndex: i];
                let frame: NSRect = msg_send![screen, frame];
                open_panel(frame, message)
            })
            .collect()
    }
}

unsafe fn open_panel(frame: NSRect, message: &str) -> Panel {
    unsafe {
        let window: id = msg_send![class!(NSWindow), alloc];
        let window: id = msg_send![window,
            initWithContentRect: frame
            styleMask: BORDERLESS_WINDOW_MASK
            backing: BACKING_STORE_BUFFERED
            defer: NO];
        let _: () = msg_send![window, setReleasedWhenClosed: NO];
        let _: () = msg_send![window, setOpaque: NO];
        let _: () = msg_send![window, setIgnoresMouseEvents: YES];
        let _: () = msg_send![window, setLevel: OVERLAY_WINDOW_LEVEL];
        let _: () = msg_send![window, setCollectionBehavior: OVERLAY_COLLECTION_BEHAVIOR];
        let tint: id = msg_send![class!(NSColor), colorWithCalibratedWhite: 0.0f64 alpha: OVERLAY_TINT_ALPHA];
        let _: () = msg_send![window, setBackgroundColor: tint];

        let content: id = msg_send![window, contentView];
        let panel = Panel {
            window,
            headline: add_label(content, message, HEADLINE_FONT_SIZE),
            status: add_label(content, "", STATUS_FONT_SIZE),
        };
        layout(&panel);
        let _: () = msg_send![window, orderFrontRegardless];
        panel
    }
}

unsafe fn add_label(content: id, text: &str, font_size: f64) -> id {
    unsafe {
        let label: id = msg_send![class!(NSTextField), labelWithString: ns_string(text)];
        let font: id = msg_send![class!(NSFont), boldSystemFontOfSize: font_size];
        let white: id = msg_send![class!(NSColor), whiteColor];
        let _: () = msg_send![label, setFont: font];
        let _: () = msg_send![label, setTextColor: white];
        let _: () = msg_send![content, addSubview: label];
        label
    }
}

/// Centre the headline above the middle of the display and the status below it
unsafe fn layout(panel: &Panel) {
    unsafe {
        let content: id = msg_send![panel.window, contentView];
        let bounds: NSRect = msg_send![content, bounds];
        let _: () = msg_send![panel.headline, sizeToFit];
        let _: () = msg_send![panel.status, sizeToFit];
        let headline: NSRect = msg_send![panel.headline, frame];
        let status: NSRect = msg_send![panel.status, frame];

        let middle = bounds.size.height / 2.0;
        let headline_origin = NSPoint::new((bounds.size.width - headline.size.width) / 2.0, middle + LABEL_SPACING);
        let status_origin = NSPoint::new(
            (bounds.size.width - status.size.width) / 2.0,
            middle - status.size.height - LABEL_SPACING,
        );
        let _: () = msg_send![panel.headline, setFrameOrigin: headline_origin];
        let _: () = msg_send![panel.status, setFrameOrigin: status_origin];
    }
}
