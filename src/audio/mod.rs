pub mod chime;

use chime::AlarmChime;

use anyhow::{anyhow, Result};
use log::{error, info};
use rodio::{OutputStream, Sink};
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;

enum AudioCommand {
    Ring { freq: f32, volume: f32 },
    Silence,
}

/// Alarm sound output. rodio's stream is not `Send`, so the device lives on a
/// dedicated thread and this handle only forwards commands to it. Device
/// failures are logged on that thread and never reach the caller.
pub struct AudioEngineHandle {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
}

impl AudioEngineHandle {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|_| anyhow!("audio handle lock poisoned"))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("alarm-audio".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn open_sink(stream: &mut Option<OutputStream>, sink: &mut Option<Sink>) -> Result<()> {
                    let (s, handle) = OutputStream::try_default()
                        .map_err(|e| anyhow!("failed to open audio output: {e}"))?;
                    let new_sink =
                        Sink::try_new(&handle).map_err(|e| anyhow!("failed to create audio sink: {e}"))?;
                    *stream = Some(s);
                    *sink = Some(new_sink);
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Ring { freq, volume } => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            _stream = None;
                            if let Err(err) = open_sink(&mut _stream, &mut sink) {
                                error!("alarm sound unavailable: {err:#}");
                                continue;
                            }
                            if let Some(ref s) = sink {
                                s.set_volume(volume.clamp(0.0, 1.0));
                                s.append(AlarmChime::new(freq));
                                s.play();
                            }
                        }
                        AudioCommand::Silence => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            _stream = None;
                        }
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn audio thread: {e}"))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    pub fn ring(&self, freq: f32, volume: f32) -> Result<()> {
        let tx = self.ensure_thread()?;
        info!("ringing at {freq}Hz");
        tx.send(AudioCommand::Ring { freq, volume })
            .map_err(|e| anyhow!("audio thread gone: {e}"))
    }

    /// No-op when nothing ever rang.
    pub fn silence(&self) -> Result<()> {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AudioCommand::Silence);
        }
        Ok(())
    }
}

impl Default for AudioEngineHandle {
    fn default() -> Self {
        Self::new()
    }
}
