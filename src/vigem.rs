/// ViGEmBus virtual Xbox 360 controller (Windows-only).
///
/// One `vigem_client::Client` is shared by every controller in the process.
/// Rumble and player LED updates arrive on the client's notification thread,
/// which is started once the target is plugged in.
///
/// Reference: https://github.com/nefarius/ViGEmBus
/// Rust crate: https://github.com/CasualX/vigem-client

#[cfg(target_os = "windows")]
pub mod imp {
    use crate::device::{ControllerState, FeedbackCommand};
    use crate::error::{BridgeError, Result};
    use crate::platform::{FeedbackHandler, VirtualController};
    use std::sync::Arc;
    use vigem_client::{Client, TargetId, XButtons, XGamepad, XNotification, Xbox360Wired};

    pub fn connect_bus() -> Result<Arc<Client>> {
        Client::connect()
            .map(Arc::new)
            .map_err(|e| BridgeError::ViGEm(format!("Cannot connect to ViGEmBus: {}", e)))
    }

    pub struct ViGEmController {
        target: Xbox360Wired<Arc<Client>>,
        feedback: Option<Arc<FeedbackHandler>>,
        notifications: Option<std::thread::JoinHandle<()>>,
    }

    impl ViGEmController {
        pub fn new(client: Arc<Client>) -> Self {
            Self {
                target: Xbox360Wired::new(client, TargetId::XBOX360_WIRED),
                feedback: None,
                notifications: None,
            }
        }

        fn start_notifications(&mut self) -> Result<()> {
            let Some(handler) = self.feedback.clone() else {
                return Ok(());
            };
            let request = self
                .target
                .request_notification()
                .map_err(|e| BridgeError::ViGEm(format!("request_notification failed: {}", e)))?;
            self.notifications = Some(request.spawn_thread(move |_, note: XNotification| {
                handler(FeedbackCommand {
                    weak_motor: note.small_motor,
                    strong_motor: note.large_motor,
                    led_index: note.led_number,
                });
            }));
            Ok(())
        }
    }

    impl VirtualController for ViGEmController {
        fn connect(&mut self) -> Result<()> {
            match self.target.plugin() {
                Ok(()) => {}
                Err(vigem_client::Error::AlreadyConnected) => {
                    return Err(BridgeError::AlreadyConnected)
                }
                Err(e) => return Err(BridgeError::ViGEm(format!("plugin failed: {}", e))),
            }
            self.target
                .wait_ready()
                .map_err(|e| BridgeError::ViGEm(format!("target not ready: {}", e)))?;
            self.start_notifications()
        }

        fn disconnect(&mut self) -> Result<()> {
            let result = self
                .target
                .unplug()
                .map_err(|e| BridgeError::ViGEm(format!("unplug failed: {}", e)));
            // The notification thread ends once its target is gone.
            self.notifications.take();
            result
        }

        fn submit(&mut self, state: &ControllerState) -> Result<()> {
            let report = XGamepad {
                buttons: XButtons {
                    raw: state.buttons.bits(),
                },
                left_trigger: state.left_trigger,
                right_trigger: state.right_trigger,
                thumb_lx: state.thumb_lx,
                thumb_ly: state.thumb_ly,
                thumb_rx: state.thumb_rx,
                thumb_ry: state.thumb_ry,
            };
            self.target
                .update(&report)
                .map_err(|e| BridgeError::ViGEm(format!("update failed: {}", e)))
        }

        fn on_feedback(&mut self, handler: FeedbackHandler) -> Result<()> {
            self.feedback = Some(Arc::new(handler));
            Ok(())
        }
    }

}
