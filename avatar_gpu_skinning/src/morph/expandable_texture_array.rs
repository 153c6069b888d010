/// Morph-target source texture array that can be reallocated larger.
///
/// Consumers that bind the texture subscribe a listener and are handed the
/// new texture whenever the array is replaced, so they never keep drawing
/// from a stale allocation.

use std::sync::{Arc, Mutex, RwLock};
use slotmap::SlotMap;
use crate::error::Result;
use crate::graphics_device::{GraphicsDevice, Texture, TextureDesc};
use crate::{skinning_bail, skinning_info};

slotmap::new_key_type! {
    /// Handle of a subscribed resize listener
    pub struct ListenerKey;
}

const SOURCE: &str = "skinning::ExpandableTextureArray";

type Listener = Arc<dyn Fn(&Arc<dyn Texture>) + Send + Sync>;

/// Texture array plus the registry of listeners told about replacements
pub struct ExpandableTextureArray {
    texture: RwLock<Arc<dyn Texture>>,
    listeners: Mutex<SlotMap<ListenerKey, Listener>>,
}

impl ExpandableTextureArray {
    pub fn new(texture: Arc<dyn Texture>) -> Self {
        Self {
            texture: RwLock::new(texture),
            listeners: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Current texture
    pub fn texture(&self) -> Arc<dyn Texture> {
        match self.texture.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn layer_count(&self) -> u32 {
        self.texture().info().array_layers
    }

    /// Register a callback run with the new texture after every replacement
    pub fn subscribe<F>(&self, listener: F) -> ListenerKey
    where
        F: Fn(&Arc<dyn Texture>) + Send + Sync + 'static,
    {
        self.lock_listeners().insert(Arc::new(listener))
    }

    /// Returns false if `key` was not subscribed
    pub fn unsubscribe(&self, key: ListenerKey) -> bool {
        self.lock_listeners().remove(key).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    /// Swap in a reallocated array and notify every listener
    ///
    /// Listeners registered at the time of the call are notified, even if
    /// one of them unsubscribes another during notification.
    pub fn replace(&self, texture: Arc<dyn Texture>) {
        {
            let mut current = match self.texture.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *current = texture.clone();
        }

        // Run outside the registry lock; listeners may unsubscribe themselves
        let listeners: Vec<Listener> = self.lock_listeners().values().cloned().collect();
        skinning_info!(SOURCE, "Texture array replaced ({} layers), notifying {} listeners",
            texture.info().array_layers, listeners.len());
        for listener in &listeners {
            listener(&texture);
        }
    }

    /// Reallocate with at least `layer_count` layers
    ///
    /// Existing layers are copied into the new array before listeners are
    /// notified. Returns `Ok(false)` when the array is already big enough.
    pub fn grow(&self, device: &mut dyn GraphicsDevice, layer_count: u32) -> Result<bool> {
        let old = self.texture();
        let info = old.info().clone();
        if layer_count <= info.array_layers {
            return Ok(false);
        }
        if info.width == 0 || info.height == 0 {
            skinning_bail!(SOURCE, "Cannot grow an empty {}x{} texture array", info.width, info.height);
        }

        let texture = device.create_texture(TextureDesc {
            label: "morph_target_source".to_string(),
            width: info.width,
            height: info.height,
            format: info.format,
            array_layers: layer_count,
        })?;
        device.copy_texture_layers(&old, &texture, info.array_layers)?;

        self.replace(texture);
        Ok(true)
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, SlotMap<ListenerKey, Listener>> {
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "expandable_texture_array_tests.rs"]
mod tests;
