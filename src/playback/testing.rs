//! Recording fakes for the element and adaptive client.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering::SeqCst},
};

use parking_lot::Mutex;

use crate::playback::{
    adaptive::{AdaptiveClient, AdaptiveClientFactory, AdaptiveConfig},
    media::{CorsMode, ElementConfig, MediaBackend, MediaElement},
};

/// Command received by [`FakeMediaElement`].
#[derive(Debug, Clone, PartialEq)]
pub enum ElementCommand {
    SetSource { url: String, cors: CorsMode },
    Load,
    Play,
    Pause,
    SetVolume(f32),
}

#[derive(Debug, Default)]
struct ElementLog {
    commands: Vec<ElementCommand>,
    source: Option<String>,
}

/// Element that records commands. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct FakeMediaElement {
    log: Arc<Mutex<ElementLog>>,
}

impl FakeMediaElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<ElementCommand> {
        self.log.lock().commands.clone()
    }

    pub fn count(&self, command: &ElementCommand) -> usize {
        self.log
            .lock()
            .commands
            .iter()
            .filter(|c| *c == command)
            .count()
    }

    pub fn loads(&self) -> usize {
        self.count(&ElementCommand::Load)
    }

    pub fn plays(&self) -> usize {
        self.count(&ElementCommand::Play)
    }

    pub fn sources(&self) -> Vec<(String, CorsMode)> {
        self.log
            .lock()
            .commands
            .iter()
            .filter_map(|c| match c {
                ElementCommand::SetSource { url, cors } => Some((url.clone(), *cors)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.log.lock().commands.clear();
    }
}

impl MediaElement for FakeMediaElement {
    fn set_source(&mut self, url: &str, cors: CorsMode) {
        let mut log = self.log.lock();
        log.source = Some(url.to_string());
        log.commands.push(ElementCommand::SetSource {
            url: url.to_string(),
            cors,
        });
    }

    fn load(&mut self) {
        self.log.lock().commands.push(ElementCommand::Load);
    }

    fn play(&mut self) {
        self.log.lock().commands.push(ElementCommand::Play);
    }

    fn pause(&mut self) {
        self.log.lock().commands.push(ElementCommand::Pause);
    }

    fn set_volume(&mut self, volume: f32) {
        self.log.lock().commands.push(ElementCommand::SetVolume(volume));
    }

    fn source(&self) -> Option<String> {
        self.log.lock().source.clone()
    }
}

/// Backend handing out one shared [`FakeMediaElement`].
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    element: FakeMediaElement,
    created: Arc<AtomicUsize>,
    configs: Arc<Mutex<Vec<ElementConfig>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle on the element's log.
    pub fn element(&self) -> FakeMediaElement {
        self.element.clone()
    }

    pub fn created(&self) -> usize {
        self.created.load(SeqCst)
    }

    pub fn configs(&self) -> Vec<ElementConfig> {
        self.configs.lock().clone()
    }
}

impl MediaBackend for FakeBackend {
    fn create_element(&self, config: &ElementConfig) -> Box<dyn MediaElement> {
        self.created.fetch_add(1, SeqCst);
        self.configs.lock().push(config.clone());
        Box::new(self.element.clone())
    }
}

/// Command received by [`FakeAdaptiveClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdaptiveCommand {
    LoadSource(String),
    AttachMedia,
    StartLoad,
    RecoverMediaError,
    Destroy,
}

/// Adaptive client that records commands. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct FakeAdaptiveClient {
    log: Arc<Mutex<Vec<AdaptiveCommand>>>,
}

impl FakeAdaptiveClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<AdaptiveCommand> {
        self.log.lock().clone()
    }

    fn record(&self, command: AdaptiveCommand) {
        self.log.lock().push(command);
    }
}

impl AdaptiveClient for FakeAdaptiveClient {
    fn load_source(&mut self, url: &str) {
        self.record(AdaptiveCommand::LoadSource(url.to_string()));
    }

    fn attach_media(&mut self) {
        self.record(AdaptiveCommand::AttachMedia);
    }

    fn start_load(&mut self) {
        self.record(AdaptiveCommand::StartLoad);
    }

    fn recover_media_error(&mut self) {
        self.record(AdaptiveCommand::RecoverMediaError);
    }

    fn destroy(&mut self) {
        self.record(AdaptiveCommand::Destroy);
    }
}

/// Factory whose clients all share one log.
#[derive(Debug, Clone)]
pub struct FakeAdaptiveFactory {
    supported: bool,
    client: FakeAdaptiveClient,
    configs: Arc<Mutex<Vec<AdaptiveConfig>>>,
}

impl FakeAdaptiveFactory {
    pub fn new(supported: bool) -> Self {
        Self {
            supported,
            client: FakeAdaptiveClient::new(),
            configs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn client(&self) -> FakeAdaptiveClient {
        self.client.clone()
    }

    pub fn configs(&self) -> Vec<AdaptiveConfig> {
        self.configs.lock().clone()
    }
}

impl AdaptiveClientFactory for FakeAdaptiveFactory {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(&self, config: &AdaptiveConfig) -> Box<dyn AdaptiveClient> {
        self.configs.lock().push(config.clone());
        Box::new(self.client.clone())
    }
}
