//! The embedded Lua engine and the callback contract scripts implement.
//!
//! A bootstrap script defines any of these globals:
//!
//! | callback | arguments | result |
//! |---|---|---|
//! | `should_consume_key_press_event` | key name, modifiers | boolean |
//! | `should_consume_configure_notify_event` | modifiers | boolean |
//! | `handle_buffer_swap` | display, drawable | ignored |
//! | `handle_context_destruction` | display, drawable | ignored |
//! | `key_press_event` | key name, modifiers | ignored |
//! | `configure_notify_event` | none | ignored |
//!
//! `ScriptEngine` does no locking; the dispatcher owns it behind its mutex.

use crate::error::{ScriptError, ShimError};
use crate::x11::{ControlMask, LockMask, Mod1Mask, ShiftMask};
use glinject_config::{log_script_debug, ShimConfig};
use libc::{c_uint, c_void};
use mlua::{IntoLuaMulti, LightUserData, Lua, Table, Value};
use std::path::Path;

/// Global holding the companion resource directory.
pub const PACKAGE_ROOT_GLOBAL: &str = "glxosdPackageRoot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    ShouldConsumeKeyPress,
    ShouldConsumeConfigureNotify,
    HandleBufferSwap,
    HandleContextDestruction,
    KeyPress,
    ConfigureNotify,
}

impl Callback {
    pub fn name(self) -> &'static str {
        match self {
            Callback::ShouldConsumeKeyPress => "should_consume_key_press_event",
            Callback::ShouldConsumeConfigureNotify => "should_consume_configure_notify_event",
            Callback::HandleBufferSwap => "handle_buffer_swap",
            Callback::HandleContextDestruction => "handle_context_destruction",
            Callback::KeyPress => "key_press_event",
            Callback::ConfigureNotify => "configure_notify_event",
        }
    }
}

/// Keyboard modifier flags handed to scripts as `{shift, caps, control, alt}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub caps: bool,
    pub control: bool,
    pub alt: bool,
}

impl Modifiers {
    /// Decode an Xlib event `state` mask.
    pub fn from_state(state: c_uint) -> Self {
        Self {
            shift: state & ShiftMask != 0,
            caps: state & LockMask != 0,
            control: state & ControlMask != 0,
            alt: state & Mod1Mask != 0,
        }
    }
}

pub struct ScriptEngine {
    pub(crate) lua: Lua,
}

impl ScriptEngine {
    /// Fresh engine with every standard library (LuaJIT `ffi` and `jit`
    /// included) and the package root global set.
    pub fn new(package_root: &str) -> mlua::Result<Self> {
        // Scripts drive native code through ffi, which the safe constructor refuses to load.
        let lua = unsafe { Lua::unsafe_new() };
        lua.globals().set(PACKAGE_ROOT_GLOBAL, package_root)?;
        Ok(Self { lua })
    }

    /// Engine with the configured bootstrap script already run.
    pub fn from_config(config: &ShimConfig) -> Result<Self, ShimError> {
        let engine = Self::new(&config.package_root).map_err(ShimError::ScriptEngine)?;
        engine.run_file(&config.bootstrap_script)?;
        Ok(engine)
    }

    pub fn run_file(&self, path: &Path) -> Result<(), ShimError> {
        let source = std::fs::read_to_string(path).map_err(|source| ShimError::ScriptRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.run_source(&format!("@{}", path.display()), &source)
            .map_err(|source| ShimError::ScriptLoad {
                path: path.to_path_buf(),
                source,
            })?;
        log_script_debug!("Ran bootstrap script", path = tracing::field::display(path.display()));
        Ok(())
    }

    pub fn run_source(&self, chunk_name: &str, source: &str) -> mlua::Result<()> {
        self.lua.load(source).set_name(chunk_name).exec()
    }

    fn invoke<'lua, A>(&'lua self, callback: Callback, args: A) -> Result<Value<'lua>, ScriptError>
    where
        A: IntoLuaMulti<'lua>,
    {
        let name = callback.name();
        let function = match self.lua.globals().get::<_, Value>(name) {
            Ok(Value::Function(function)) => function,
            Ok(Value::Nil) | Err(_) => return Err(ScriptError::Missing { callback: name }),
            Ok(other) => {
                return Err(ScriptError::NotCallable {
                    callback: name,
                    got: other.type_name(),
                })
            }
        };
        function
            .call::<_, Value>(args)
            .map_err(|source| ScriptError::Runtime {
                callback: name,
                source,
            })
    }

    fn expect_boolean(callback: Callback, value: Value) -> Result<bool, ScriptError> {
        match value {
            Value::Boolean(consume) => Ok(consume),
            other => Err(ScriptError::NotBoolean {
                callback: callback.name(),
                got: other.type_name(),
            }),
        }
    }

    fn modifier_table(&self, callback: Callback, modifiers: Modifiers) -> Result<Table<'_>, ScriptError> {
        let table = self
            .lua
            .create_table_with_capacity(0, 4)
            .and_then(|table| {
                table.set("shift", modifiers.shift)?;
                table.set("caps", modifiers.caps)?;
                table.set("control", modifiers.control)?;
                table.set("alt", modifiers.alt)?;
                Ok(table)
            });
        table.map_err(|source| ScriptError::Runtime {
            callback: callback.name(),
            source,
        })
    }

    pub fn should_consume_key_press(
        &self,
        key: Option<&str>,
        modifiers: Modifiers,
    ) -> Result<bool, ScriptError> {
        let callback = Callback::ShouldConsumeKeyPress;
        let mods = self.modifier_table(callback, modifiers)?;
        let result = self.invoke(callback, (key, mods))?;
        Self::expect_boolean(callback, result)
    }

    pub fn should_consume_configure_notify(&self, modifiers: Modifiers) -> Result<bool, ScriptError> {
        let callback = Callback::ShouldConsumeConfigureNotify;
        let mods = self.modifier_table(callback, modifiers)?;
        let result = self.invoke(callback, mods)?;
        Self::expect_boolean(callback, result)
    }

    /// `drawable` reaches Lua as a number, `display` as light userdata.
    pub fn handle_buffer_swap(&self, display: *mut c_void, drawable: u64) -> Result<(), ScriptError> {
        self.invoke(
            Callback::HandleBufferSwap,
            (LightUserData(display), drawable as f64),
        )
        .map(drop)
    }

    pub fn handle_context_destruction(
        &self,
        display: *mut c_void,
        drawable: u64,
    ) -> Result<(), ScriptError> {
        self.invoke(
            Callback::HandleContextDestruction,
            (LightUserData(display), drawable as f64),
        )
        .map(drop)
    }

    pub fn key_press_event(&self, key: Option<&str>, modifiers: Modifiers) -> Result<(), ScriptError> {
        let mods = self.modifier_table(Callback::KeyPress, modifiers)?;
        self.invoke(Callback::KeyPress, (key, mods)).map(drop)
    }

    pub fn configure_notify_event(&self) -> Result<(), ScriptError> {
        self.invoke(Callback::ConfigureNotify, ()).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glinject_config::testing::ScriptFixture;

    const KEY_FILTER: &str = r#"
        function should_consume_key_press_event(key, mods)
            return key == "F12" and mods.shift and mods.alt and not mods.control
        end
    "#;

    fn engine_with(source: &str) -> ScriptEngine {
        let engine = ScriptEngine::new("/opt/glinject").unwrap();
        engine.run_source("test", source).unwrap();
        engine
    }

    fn shift_alt() -> Modifiers {
        Modifiers {
            shift: true,
            alt: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_modifiers_from_state() {
        assert_eq!(Modifiers::from_state(0), Modifiers::default());
        assert_eq!(Modifiers::from_state(ShiftMask | Mod1Mask), shift_alt());
        let all = Modifiers::from_state(ShiftMask | LockMask | ControlMask | Mod1Mask | 0x40);
        assert!(all.shift && all.caps && all.control && all.alt);
    }

    #[test]
    fn test_key_filter_with_shift_alt() {
        let engine = engine_with(KEY_FILTER);
        assert!(engine.should_consume_key_press(Some("F12"), shift_alt()).unwrap());
        assert!(!engine
            .should_consume_key_press(
                Some("F12"),
                Modifiers {
                    shift: true,
                    ..Default::default()
                }
            )
            .unwrap());
        assert!(!engine.should_consume_key_press(Some("F11"), shift_alt()).unwrap());
        assert!(!engine.should_consume_key_press(None, shift_alt()).unwrap());
    }

    #[test]
    fn test_modifier_table_has_exactly_four_fields() {
        let engine = engine_with(
            r#"
            function should_consume_configure_notify_event(mods)
                local n = 0
                for _ in pairs(mods) do n = n + 1 end
                return n == 4 and mods.caps == true and mods.shift == false
            end
            "#,
        );
        let caps = Modifiers {
            caps: true,
            ..Default::default()
        };
        assert!(engine.should_consume_configure_notify(caps).unwrap());
    }

    #[test]
    fn test_package_root_global() {
        let engine = engine_with("root_seen = glxosdPackageRoot");
        let root: String = engine.lua.globals().get("root_seen").unwrap();
        assert_eq!(root, "/opt/glinject");
        assert_eq!(PACKAGE_ROOT_GLOBAL, "glxosdPackageRoot");
    }

    #[test]
    fn test_ffi_is_available() {
        let engine = engine_with("local ffi = require('ffi'); has_ffi = ffi ~= nil");
        let has_ffi: bool = engine.lua.globals().get("has_ffi").unwrap();
        assert!(has_ffi);
    }

    #[test]
    fn test_missing_callback() {
        let engine = engine_with("");
        let err = engine.configure_notify_event().unwrap_err();
        assert!(matches!(err, ScriptError::Missing { callback: "configure_notify_event" }));
        let err = engine.should_consume_key_press(Some("a"), Modifiers::default()).unwrap_err();
        assert!(matches!(err, ScriptError::Missing { .. }));
    }

    #[test]
    fn test_non_callable_callback() {
        let engine = engine_with("handle_buffer_swap = 42");
        let err = engine
            .handle_buffer_swap(std::ptr::null_mut(), 1)
            .unwrap_err();
        assert!(matches!(err, ScriptError::NotCallable { got: "number", .. }));
    }

    #[test]
    fn test_non_boolean_filter_result() {
        let engine = engine_with("function should_consume_key_press_event() return 'yes' end");
        let err = engine
            .should_consume_key_press(Some("F12"), Modifiers::default())
            .unwrap_err();
        assert!(matches!(err, ScriptError::NotBoolean { got: "string", .. }));
    }

    #[test]
    fn test_runtime_error_is_reported() {
        let engine = engine_with("function key_press_event() error('boom') end");
        let err = engine.key_press_event(Some("a"), Modifiers::default()).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { callback: "key_press_event", .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_buffer_swap_arguments() {
        let engine = engine_with(
            r#"
            function handle_buffer_swap(display, drawable)
                display_type = type(display)
                drawable_seen = drawable
            end
            "#,
        );
        let mut marker = 0u8;
        engine
            .handle_buffer_swap(&mut marker as *mut u8 as *mut c_void, 0x4200_0001)
            .unwrap();
        let globals = engine.lua.globals();
        assert_eq!(globals.get::<_, String>("display_type").unwrap(), "userdata");
        assert_eq!(globals.get::<_, f64>("drawable_seen").unwrap(), 0x4200_0001 as f64);
    }

    #[test]
    fn test_from_config_runs_bootstrap_script() {
        let fixture = ScriptFixture::new().unwrap();
        let script = fixture
            .write_script("boot.lua", "booted_from = glxosdPackageRoot")
            .unwrap();
        let engine = ScriptEngine::from_config(&fixture.config(&script)).unwrap();
        let booted_from: String = engine.lua.globals().get("booted_from").unwrap();
        assert_eq!(booted_from, fixture.package_root.to_string_lossy());
    }

    #[test]
    fn test_from_config_reports_script_failures() {
        let fixture = ScriptFixture::new().unwrap();

        let missing = fixture.missing_script();
        let err = ScriptEngine::from_config(&fixture.config(&missing)).err().unwrap();
        assert!(matches!(err, ShimError::ScriptRead { .. }));

        let broken = fixture.write_script("broken.lua", "function (").unwrap();
        let err = ScriptEngine::from_config(&fixture.config(&broken)).err().unwrap();
        assert!(matches!(err, ShimError::ScriptLoad { .. }));
        assert!(err.to_string().contains("broken.lua"));
    }
}
