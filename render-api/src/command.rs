//! Contract for handing work to the render thread.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use overpass_rhi::{CommandList, Device, RhiError};

/// Command list plus device as seen from the render thread. Derefs to the list being recorded.
pub struct RhiCommandListImmediate {
    device: Arc<dyn Device>,
    commands: CommandList,
}

impl RhiCommandListImmediate {
    pub fn new(device: Arc<dyn Device>, label: &'static str) -> Self {
        Self { device, commands: CommandList::new(label) }
    }

    pub fn device(&self) -> &Arc<dyn Device> {
        &self.device
    }

    /// Submit what has been recorded so far and start a fresh list with the same label.
    pub fn flush(&mut self) -> Result<(), RhiError> {
        let label = self.commands.label();
        let commands = std::mem::replace(&mut self.commands, CommandList::new(label));
        if commands.is_empty() {
            return Ok(());
        }
        self.device.submit(commands)
    }
}

impl Deref for RhiCommandListImmediate {
    type Target = CommandList;

    fn deref(&self) -> &CommandList {
        &self.commands
    }
}

impl DerefMut for RhiCommandListImmediate {
    fn deref_mut(&mut self) -> &mut CommandList {
        &mut self.commands
    }
}

pub type RenderCommand = Box<dyn FnOnce(&mut RhiCommandListImmediate) + Send + 'static>;

#[derive(Debug, thiserror::Error)]
#[error("render command stream closed; '{0}' dropped")]
pub struct StreamClosed(pub &'static str);

/// Single FIFO of work executed on the render thread in submission order.
pub trait RenderCommandStream: Send + Sync {
    fn enqueue(&self, name: &'static str, command: RenderCommand) -> Result<(), StreamClosed>;
}
