//! The render command stream: one FIFO channel, drained either on demand by the owner of the
//! render context or continuously by a dedicated thread.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use overpass_rhi::Device;
use render_api::{RenderCommand, RenderCommandStream, RhiCommandListImmediate, StreamClosed};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("render thread is gone")]
    Disconnected,
    #[error("render thread panicked")]
    Panicked,
    #[error("no GPU device: {0}")]
    Device(#[from] overpass_rhi::RhiError),
}

enum Message {
    Command { name: &'static str, command: RenderCommand },
    Shutdown,
}

/// Cloneable producer side of the stream. Posting never blocks.
#[derive(Clone)]
pub struct RenderCommandSender {
    sender: Sender<Message>,
}

impl RenderCommandStream for RenderCommandSender {
    fn enqueue(&self, name: &'static str, command: RenderCommand) -> Result<(), StreamClosed> {
        self.sender.send(Message::Command { name, command }).map_err(|_| StreamClosed(name))
    }
}

/// Run one command against a fresh immediate list, then submit what it recorded.
fn execute(device: &Arc<dyn Device>, name: &'static str, command: RenderCommand) {
    let mut rhi_cmd_list = RhiCommandListImmediate::new(Arc::clone(device), name);
    command(&mut rhi_cmd_list);
    if let Err(err) = rhi_cmd_list.flush() {
        log::error!("render command '{name}': {err}");
    }
}

/// Stream whose consumer is whoever calls [`RenderCommandQueue::drain`], once per tick.
pub struct RenderCommandQueue {
    device: Arc<dyn Device>,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl RenderCommandQueue {
    pub fn new(device: Arc<dyn Device>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { device, sender, receiver }
    }

    pub fn sender(&self) -> RenderCommandSender {
        RenderCommandSender { sender: self.sender.clone() }
    }

    /// Commands posted but not yet run.
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Execute everything posted so far, in order. Returns how many commands ran.
    pub fn drain(&self) -> usize {
        let mut executed = 0;
        while let Ok(message) = self.receiver.try_recv() {
            if let Message::Command { name, command } = message {
                execute(&self.device, name, command);
                executed += 1;
            }
        }
        executed
    }
}

impl RenderCommandStream for RenderCommandQueue {
    fn enqueue(&self, name: &'static str, command: RenderCommand) -> Result<(), StreamClosed> {
        self.sender.send(Message::Command { name, command }).map_err(|_| StreamClosed(name))
    }
}

/// Dedicated render execution thread consuming the stream until shut down.
pub struct RenderThread {
    sender: Sender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl RenderThread {
    pub fn spawn(device: Arc<dyn Device>) -> Result<Self, BridgeError> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Message>();
        let handle = std::thread::Builder::new().name("overpass-render".into()).spawn(move || {
            log::debug!("render thread started");
            for message in receiver.iter() {
                match message {
                    Message::Command { name, command } => execute(&device, name, command),
                    Message::Shutdown => break,
                }
            }
            log::debug!("render thread stopped");
        })?;
        Ok(Self { sender, handle: Some(handle) })
    }

    pub fn sender(&self) -> RenderCommandSender {
        RenderCommandSender { sender: self.sender.clone() }
    }

    /// Run everything posted before this call, then stop the thread.
    /// Posting afterwards fails with [`StreamClosed`].
    pub fn shutdown(mut self) -> Result<(), BridgeError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), BridgeError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.sender.send(Message::Shutdown).map_err(|_| BridgeError::Disconnected)?;
        handle.join().map_err(|_| BridgeError::Panicked)
    }
}

impl RenderCommandStream for RenderThread {
    fn enqueue(&self, name: &'static str, command: RenderCommand) -> Result<(), StreamClosed> {
        self.sender.send(Message::Command { name, command }).map_err(|_| StreamClosed(name))
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("render thread shutdown: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overpass_rhi::headless::HeadlessDevice;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<u32>>>, value: u32) -> RenderCommand {
        let log = Arc::clone(log);
        Box::new(move |_: &mut RhiCommandListImmediate| log.lock().unwrap().push(value))
    }

    #[test]
    fn queue_drains_in_post_order() {
        let queue = RenderCommandQueue::new(Arc::new(HeadlessDevice::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sender = queue.sender();
        for i in 0..5 {
            sender.enqueue("record", recorder(&seen, i)).unwrap();
        }
        assert_eq!(queue.pending(), 5);
        assert_eq!(queue.drain(), 5);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.drain(), 0);
    }

    #[test]
    fn thread_runs_everything_before_shutdown() {
        let thread = RenderThread::spawn(Arc::new(HeadlessDevice::default())).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sender = thread.sender();
        for i in 0..100 {
            sender.enqueue("record", recorder(&seen, i)).unwrap();
        }
        thread.shutdown().unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn posting_after_shutdown_fails() {
        let thread = RenderThread::spawn(Arc::new(HeadlessDevice::default())).unwrap();
        let sender = thread.sender();
        thread.shutdown().unwrap();
        assert!(sender.enqueue("late", Box::new(|_: &mut RhiCommandListImmediate| {})).is_err());
    }

    #[test]
    fn recorded_commands_are_submitted() {
        let device = Arc::new(HeadlessDevice::default());
        let queue = RenderCommandQueue::new(device.clone());
        queue
            .enqueue(
                "transition",
                Box::new(|list: &mut RhiCommandListImmediate| {
                    let texture = list
                        .device()
                        .create_texture(&overpass_rhi::TextureDescriptor {
                            label: "t",
                            width: 4,
                            height: 4,
                            format: overpass_rhi::TextureFormat::Rgba8Unorm,
                            usage: overpass_rhi::TextureUsage::SHADER_RESOURCE,
                        })
                        .unwrap();
                    list.transition(texture, overpass_rhi::ResourceAccess::Unknown, overpass_rhi::ResourceAccess::ShaderRead);
                }),
            )
            .unwrap();
        queue.drain();
        assert_eq!(device.submitted().len(), 1);
        assert_eq!(device.submitted()[0].label(), "transition");
    }
}
