//! The system: the engine's handle on the host platform.

use platform::{Backend, FontFlags, FontId};

pub struct SystemConfig {
    pub default_face: String,
    pub default_size: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig { default_face: "sans".to_string(), default_size: 16 }
    }
}

pub struct System {
    backend: Box<dyn Backend>,
    pub config: SystemConfig,
    default_font: FontId,
}

impl System {
    pub fn new(mut backend: Box<dyn Backend>, config: SystemConfig) -> System {
        let default_font =
            backend.match_font(&config.default_face, config.default_size, FontFlags::default());
        System { backend, config, default_font }
    }

    pub fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    pub fn backend_mut(&mut self) -> &mut dyn Backend {
        &mut *self.backend
    }

    pub fn default_font(&self) -> FontId {
        self.default_font
    }

    pub fn match_font(&mut self, face: &str, size: u32, flags: FontFlags) -> FontId {
        self.backend.match_font(face, size, flags)
    }
}
