//! X11 raw input source — XInput2 raw key events, keysym naming, event thread.
//!
//! Selects `RawKeyPress`/`RawKeyRelease` on the root window for all
//! master devices. Nothing is grabbed, so keys still reach the focused
//! application. Keycodes are named through the server keyboard mapping;
//! keypad keys report their NumLock level when NumLock is on.

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::mpsc;
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xinput::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{self, Window};
use x11rb::rust_connection::RustConnection;

use super::HotkeyError;
use super::decoder::{KeyAction, RawKeyEvent};
use super::keybinding::{Keysym, keysym_name};

/// XK_Num_Lock keysym for dynamic modifier detection.
const XK_NUM_LOCK: Keysym = 0xff7f;

/// XInput version announced to the server. Clients announcing 2.1 or
/// later receive raw events even while another client holds a grab.
const XI_VERSION: (u16, u16) = (2, 2);

/// Keypad keysym range (`XK_KP_Space`..=`XK_KP_9`).
const KEYPAD_KEYSYMS: std::ops::RangeInclusive<Keysym> = 0xff80..=0xffb9;

/// Snapshot of the server's keycode → keysym table.
struct Keymap {
    min_keycode: u8,
    syms_per_code: usize,
    keysyms: Vec<Keysym>,
}

impl Keymap {
    fn load(conn: &RustConnection) -> Result<Self, HotkeyError> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let count = setup.max_keycode - min_keycode + 1;

        let reply = xproto::get_keyboard_mapping(conn, min_keycode, count)
            .map_err(|e| HotkeyError::X11(format!("get_keyboard_mapping: {e}")))?
            .reply()
            .map_err(|e| HotkeyError::X11(format!("get_keyboard_mapping reply: {e}")))?;

        Ok(Self {
            min_keycode,
            syms_per_code: reply.keysyms_per_keycode as usize,
            keysyms: reply.keysyms,
        })
    }

    fn keysym(&self, keycode: u8, level: usize) -> Option<Keysym> {
        if self.syms_per_code == 0 || keycode < self.min_keycode || level >= self.syms_per_code {
            return None;
        }
        let base = usize::from(keycode - self.min_keycode) * self.syms_per_code;
        self.keysyms.get(base + level).copied().filter(|&s| s != 0)
    }

    /// Reported name for a keycode. Keypad keys use their second level
    /// (`KP_1` rather than `KP_End`) while NumLock is on.
    fn name(&self, keycode: u8, numlock_on: bool) -> Option<String> {
        let base = self.keysym(keycode, 0)?;
        if numlock_on
            && let Some(shifted) = self.keysym(keycode, 1)
            && KEYPAD_KEYSYMS.contains(&shifted)
        {
            return keysym_name(shifted);
        }
        keysym_name(base)
    }
}

/// X11 connection subscribed to raw key events.
pub struct X11Source {
    conn: Arc<RustConnection>,
    screen_num: usize,
    root: Window,
    numlock_mask: u16,
}

impl X11Source {
    /// Connect to the X11 display and select XInput2 raw key events.
    pub fn connect() -> Result<Self, HotkeyError> {
        let (conn, screen_num) = RustConnection::connect(None)
            .map_err(|e| HotkeyError::X11(format!("connect failed: {e}")))?;

        let root = conn.setup().roots[screen_num].root;

        let version = conn
            .xinput_xi_query_version(XI_VERSION.0, XI_VERSION.1)
            .map_err(|e| HotkeyError::X11(format!("XInput2 unavailable: {e}")))?
            .reply()
            .map_err(|e| HotkeyError::X11(format!("xi_query_version reply: {e}")))?;
        check_xi_version(version.major_version, version.minor_version)?;

        conn.xinput_xi_select_events(
            root,
            &[xinput::EventMask {
                deviceid: xinput::Device::ALL_MASTER.into(),
                mask: vec![
                    xinput::XIEventMask::RAW_KEY_PRESS | xinput::XIEventMask::RAW_KEY_RELEASE,
                ],
            }],
        )
        .map_err(|e| HotkeyError::X11(format!("xi_select_events: {e}")))?
        .check()
        .map_err(|e| HotkeyError::X11(format!("xi_select_events rejected: {e}")))?;

        let numlock_mask = detect_numlock_mask(&conn);
        tracing::debug!(
            numlock_mask = format_args!("0x{numlock_mask:04x}"),
            "detected NumLock modifier"
        );

        Ok(Self {
            conn: Arc::new(conn),
            screen_num,
            root,
            numlock_mask,
        })
    }

    pub fn screen_num(&self) -> usize {
        self.screen_num
    }

    /// Spawn a dedicated thread that polls the X11 connection for events.
    ///
    /// Uses `nix::poll()` on the connection fd with a 100ms timeout and
    /// drains everything readable. Checks `stop` each iteration for clean
    /// shutdown. The keyboard mapping is reloaded on `MappingNotify`.
    pub fn spawn_event_thread(
        self,
        stop: Arc<AtomicBool>,
    ) -> Result<(mpsc::UnboundedReceiver<RawKeyEvent>, JoinHandle<()>), HotkeyError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut keymap = Keymap::load(&self.conn)?;

        let handle = std::thread::Builder::new()
            .name("x11-input".into())
            .spawn(move || {
                let raw_fd = self.conn.stream().as_raw_fd();

                while !stop.load(Ordering::Relaxed) {
                    // SAFETY: raw_fd is the X11 connection fd, valid while conn is alive.
                    let borrowed = unsafe { BorrowedFd::borrow_raw(raw_fd) };
                    let mut fds = [PollFd::new(borrowed, PollFlags::POLLIN)];

                    match poll(&mut fds, PollTimeout::from(100u16)) {
                        Ok(0) => continue,
                        Ok(_) => loop {
                            let event = match self.conn.poll_for_event() {
                                Ok(Some(event)) => event,
                                Ok(None) => break,
                                Err(e) => {
                                    tracing::error!(error = %e, "X11 connection error");
                                    return;
                                }
                            };

                            let (detail, action) = match event {
                                Event::XinputRawKeyPress(e) => (e.detail, KeyAction::Down),
                                Event::XinputRawKeyRelease(e) => (e.detail, KeyAction::Up),
                                Event::MappingNotify(_) => {
                                    match Keymap::load(&self.conn) {
                                        Ok(fresh) => keymap = fresh,
                                        Err(e) => {
                                            tracing::warn!(error = %e, "keymap reload failed")
                                        }
                                    }
                                    continue;
                                }
                                _ => continue,
                            };

                            let Ok(keycode) = u8::try_from(detail) else {
                                continue;
                            };
                            let Some(key) = keymap.name(keycode, self.numlock_on()) else {
                                tracing::trace!(keycode, "unnamed keycode");
                                continue;
                            };

                            let event = RawKeyEvent {
                                key,
                                action,
                                captured_at: Some(Instant::now()),
                            };
                            if tx.send(event).is_err() {
                                // Receiver dropped.
                                return;
                            }
                        },
                        Err(nix::Error::EINTR) => continue,
                        Err(e) => {
                            tracing::error!(error = %e, "poll error on X11 fd");
                            return;
                        }
                    }
                }
            })?;

        Ok((rx, handle))
    }

    /// Current NumLock state, read from the pointer's modifier mask.
    fn numlock_on(&self) -> bool {
        match xproto::query_pointer(&*self.conn, self.root).map(|c| c.reply()) {
            Ok(Ok(reply)) => u16::from(reply.mask) & self.numlock_mask != 0,
            _ => false,
        }
    }
}

/// Raw events must arrive regardless of other clients' grabs, which the
/// server only guarantees from XInput 2.1 on.
fn check_xi_version(major: u16, minor: u16) -> Result<(), HotkeyError> {
    if (major, minor) < (2, 1) {
        return Err(HotkeyError::X11(format!(
            "XInput {major}.{minor} too old, need 2.1"
        )));
    }
    Ok(())
}

/// Detect which modifier bit corresponds to NumLock by querying the
/// X11 modifier mapping and keyboard mapping.
///
/// Falls back to Mod2 (0x0010), the xmodmap default, if detection
/// fails.
fn detect_numlock_mask(conn: &RustConnection) -> u16 {
    const FALLBACK: u16 = 0x0010; // Mod2Mask

    let Ok(Ok(mod_reply)) = xproto::get_modifier_mapping(conn).map(|c| c.reply()) else {
        return FALLBACK;
    };
    let keycodes_per_mod = mod_reply.keycodes_per_modifier() as usize;
    if keycodes_per_mod == 0 {
        return FALLBACK;
    }

    let Ok(keymap) = Keymap::load(conn) else {
        return FALLBACK;
    };
    let numlock_keycodes: Vec<u8> = (keymap.min_keycode..=conn.setup().max_keycode)
        .filter(|&kc| {
            (0..keymap.syms_per_code).any(|lvl| keymap.keysym(kc, lvl) == Some(XK_NUM_LOCK))
        })
        .collect();

    // Modifier map: 8 rows × keycodes_per_modifier; row i is mask bit 1 << i.
    for modifier_idx in 0..8usize {
        let row_start = modifier_idx * keycodes_per_mod;
        for k in 0..keycodes_per_mod {
            if let Some(&keycode) = mod_reply.keycodes.get(row_start + k)
                && keycode != 0
                && numlock_keycodes.contains(&keycode)
            {
                return 1u16 << modifier_idx;
            }
        }
    }

    FALLBACK
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two keycodes starting at 10: a keypad key and a plain letter.
    fn keymap() -> Keymap {
        Keymap {
            min_keycode: 10,
            syms_per_code: 2,
            keysyms: vec![
                0xff9c, 0xffb1, // KP_End / KP_1
                0x61, 0x41, // a / A
                0, 0, // unmapped
            ],
        }
    }

    #[test]
    fn keypad_name_follows_numlock() {
        let km = keymap();
        assert_eq!(km.name(10, false).as_deref(), Some("KP_End"));
        assert_eq!(km.name(10, true).as_deref(), Some("KP_1"));
    }

    #[test]
    fn non_keypad_ignores_numlock() {
        let km = keymap();
        assert_eq!(km.name(11, false).as_deref(), Some("a"));
        assert_eq!(km.name(11, true).as_deref(), Some("a"));
    }

    #[test]
    fn xi_version_must_be_at_least_2_1() {
        assert!(check_xi_version(2, 0).is_err());
        assert!(check_xi_version(1, 5).is_err());
        assert!(check_xi_version(2, 1).is_ok());
        assert!(check_xi_version(2, 4).is_ok());
        assert!(check_xi_version(3, 0).is_ok());
    }

    #[test]
    fn out_of_range_and_unmapped_keycodes() {
        let km = keymap();
        assert_eq!(km.name(9, false), None);
        assert_eq!(km.name(12, false), None);
        assert_eq!(km.name(200, false), None);
        assert_eq!(km.keysym(10, 5), None);
    }
}
