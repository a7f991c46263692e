//! Type definitions for keyboard input as delivered by the seat.

use bitflags::bitflags;

use strum::*;

//* Re-exports
pub mod keysym {
    //! Keysym values, as defined by the X keysym tables.
    //!
    //! xkb keysyms carry the same values as their X counterparts, so
    //! the constant tables are re-exported wholesale.
    pub type Keysym = u32;
    pub use x11::keysym::*;
}

use keysym::Keysym;

/// A keycode as received from the seat keyboard.
pub type KeyCode = u32;

bitflags! {

/// Bitmask representing one or a combination of modifier keys.
///
/// Bit positions follow the seat's modifier ordering.
pub struct ModMask: u32 {
    /// The Shift key.
    const SHIFT = 1 << 0;
    /// The Capslock key.
    const CAPS  = 1 << 1;
    /// The Control key.
    const CTRL  = 1 << 2;
    /// The Alt key.
    const ALT   = 1 << 3;
    /// The Numlock key.
    const MOD2  = 1 << 4;
    const MOD3  = 1 << 5;
    /// The Super/Meta/Logo key.
    const LOGO  = 1 << 6;
    const MOD5  = 1 << 7;
}

}

/// A type representing a modifier key tied to a certain keybind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter)]
pub enum ModKey {
    /// The Ctrl key.
    Ctrl,
    /// The Alt key.
    Alt,
    /// The Shift key.
    Shift,
    /// The Super/Meta/Logo key.
    Logo,
}

impl From<ModKey> for ModMask {
    fn from(from: ModKey) -> ModMask {
        match from {
            ModKey::Ctrl => ModMask::CTRL,
            ModKey::Alt => ModMask::ALT,
            ModKey::Shift => ModMask::SHIFT,
            ModKey::Logo => ModMask::LOGO,
        }
    }
}

#[doc(hidden)]
impl From<Vec<ModKey>> for ModMask {
    fn from(from: Vec<ModKey>) -> ModMask {
        from.into_iter()
            .fold(ModMask::empty(), |acc, n| acc | ModMask::from(n))
    }
}

/// A key consumed by menu navigation while the seat is in menu mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuKey {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Escape,
}

impl MenuKey {
    /// Maps a keysym onto a menu navigation key.
    pub fn from_keysym(sym: Keysym) -> Option<MenuKey> {
        match sym {
            keysym::XK_Up => Some(MenuKey::Up),
            keysym::XK_Down => Some(MenuKey::Down),
            keysym::XK_Left => Some(MenuKey::Left),
            keysym::XK_Right => Some(MenuKey::Right),
            keysym::XK_Return | keysym::XK_KP_Enter => Some(MenuKey::Enter),
            keysym::XK_Escape => Some(MenuKey::Escape),
            _ => None,
        }
    }
}

/// Tests whether a keysym is a modifier key.
pub fn is_modifier(sym: Keysym) -> bool {
    // XK_Shift_L through XK_Hyper_R, plus the ISO level shifts
    (keysym::XK_Shift_L..=keysym::XK_Hyper_R).contains(&sym)
        || sym == keysym::XK_ISO_Level3_Shift
        || sym == keysym::XK_ISO_Level5_Shift
}

/// Lowercases a keysym, for case-insensitive keybind matching.
///
/// Handles the Latin-1 block, which covers every keysym a textual
/// keybind specification can name.
pub fn keysym_to_lower(sym: Keysym) -> Keysym {
    match sym {
        0x41..=0x5a => sym + 0x20,
        // Latin-1 uppercase, skipping the multiplication sign
        0xc0..=0xde if sym != 0xd7 => sym + 0x20,
        _ => sym,
    }
}

/// If the keysym is a VT-switch request, returns the VT number.
pub fn vt_switch(sym: Keysym) -> Option<u32> {
    if (keysym::XF86XK_Switch_VT_1..=keysym::XF86XK_Switch_VT_12).contains(&sym) {
        Some(sym - keysym::XF86XK_Switch_VT_1 + 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_detection() {
        assert!(is_modifier(keysym::XK_Shift_L));
        assert!(is_modifier(keysym::XK_Super_R));
        assert!(!is_modifier(keysym::XK_a));
        assert!(!is_modifier(keysym::XK_Escape));
    }

    #[test]
    fn lowercase_folding() {
        assert_eq!(keysym_to_lower(keysym::XK_A), keysym::XK_a);
        assert_eq!(keysym_to_lower(keysym::XK_a), keysym::XK_a);
        assert_eq!(keysym_to_lower(keysym::XK_Escape), keysym::XK_Escape);
    }

    #[test]
    fn vt_switch_range() {
        assert_eq!(vt_switch(keysym::XF86XK_Switch_VT_1), Some(1));
        assert_eq!(vt_switch(keysym::XF86XK_Switch_VT_12), Some(12));
        assert_eq!(vt_switch(keysym::XK_F1), None);
    }

    #[test]
    fn modkey_vec_to_mask() {
        let mask: ModMask = vec![ModKey::Logo, ModKey::Shift].into();
        assert_eq!(mask, ModMask::LOGO | ModMask::SHIFT);
    }
}
