//! Plugin module boundary
//!
//! A [`Plugin`] wraps a loaded [`PluginModule`]. The provider is created once
//! at load time; the component and the view are built lazily on first use
//! and cached. Any load failure leaves the plugin in the invalid state
//! instead of surfacing an error to the caller.

use once_cell::sync::OnceCell;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin module '{0}' has no provider")]
    NoProvider(String),

    #[error("plugin '{name}' failed to create its {part}: {message}")]
    Create { name: String, part: &'static str, message: String },
}

/// Audio processing side of a plugin
pub trait PluginComponent: Send + Sync {
    fn name(&self) -> &str;
}

/// Editor view of a plugin
pub trait PluginView: Send + Sync {
    fn title(&self) -> &str;
}

/// Factory for the parts of one plugin
pub trait PluginProvider: Send + Sync {
    fn component(&self) -> Result<Arc<dyn PluginComponent>, PluginError>;
    fn view(&self) -> Result<Arc<dyn PluginView>, PluginError>;
}

/// A loadable plugin binary
pub trait PluginModule: Send + Sync {
    fn name(&self) -> &str;
    fn provider(&self) -> Result<Box<dyn PluginProvider>, PluginError>;
}

/// Receives components that must only be driven from the audio thread
pub trait AudioThreadSecurer: Send + Sync {
    fn hand_over(&self, component: Arc<dyn PluginComponent>);
}

pub struct Plugin {
    module: Arc<dyn PluginModule>,
    provider: Option<Box<dyn PluginProvider>>,
    component: OnceCell<Option<Arc<dyn PluginComponent>>>,
    view: OnceCell<Option<Arc<dyn PluginView>>>,
    securer: Option<Arc<dyn AudioThreadSecurer>>,
}

impl Plugin {
    pub fn load(module: Arc<dyn PluginModule>) -> Self {
        let provider = match module.provider() {
            Ok(p) => Some(p),
            Err(e) => {
                log::error!("plugin load failed: {}", e);
                None
            }
        };
        Self {
            module,
            provider,
            component: OnceCell::new(),
            view: OnceCell::new(),
            securer: None,
        }
    }

    /// Hand freshly created components to `securer`
    pub fn with_audio_thread(mut self, securer: Arc<dyn AudioThreadSecurer>) -> Self {
        self.securer = Some(securer);
        self
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn is_valid(&self) -> bool {
        self.provider.is_some()
    }

    pub fn component(&self) -> Option<Arc<dyn PluginComponent>> {
        let provider = self.provider.as_ref()?;
        self.component
            .get_or_init(|| match provider.component() {
                Ok(c) => {
                    if let Some(securer) = &self.securer {
                        securer.hand_over(c.clone());
                    }
                    Some(c)
                }
                Err(e) => {
                    log::error!("{}", e);
                    None
                }
            })
            .clone()
    }

    pub fn view(&self) -> Option<Arc<dyn PluginView>> {
        let provider = self.provider.as_ref()?;
        self.view
            .get_or_init(|| provider.view().map_err(|e| log::error!("{}", e)).ok())
            .clone()
    }
}
