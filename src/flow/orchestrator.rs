use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use tracing::{debug, info, warn};

use super::artifact::TempArtifact;
use super::captions;
use super::error::FlowError;
use crate::config::Config;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::media::{
    clean_url, looks_like_url, select_offers, DownloadRequest, FailureKind, FormatSelection,
    MediaKind, MediaResolver, Offers, Platform, ResolvedMedia, ResolverError, ToolReport,
};
use crate::observability::Metrics;
use crate::selection::{new_token, SelectionCache, SelectionEntry};
use crate::transport::{
    ChatAction, ChatId, ChatTransport, ChatUser, Choice, FileDelivery, InboundEvent, MessageId,
    TextFormat,
};
use crate::users::{ProfileUpdate, UserDirectory, UserProfile};

/// Extra time the dispatcher allows beyond the resolver's own download limit
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

/// Tunables the flow reads on every request
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub bot_username: String,
    /// Upper bound for one inbound event, queue wait included
    pub handler_timeout: Duration,
    pub queue_reject_threshold: usize,
    pub info_retries: u32,
    pub retry_base_delay: Duration,
    pub info_timeout: Duration,
    pub download_timeout: Duration,
    pub max_video_variants: usize,
    pub min_video_height: u32,
    pub max_upload_bytes: u64,
    pub temp_dir: PathBuf,
}

impl FlowSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bot_username: config.bot.username.clone(),
            handler_timeout: Duration::from_secs(config.bot.handler_timeout_secs),
            queue_reject_threshold: config.dispatcher.queue_reject_threshold,
            info_retries: config.resolver.info_retries,
            retry_base_delay: config.resolver.retry_base_delay(),
            info_timeout: config.resolver.info_timeout(),
            download_timeout: config.resolver.download_timeout(),
            max_video_variants: config.resolver.max_video_variants,
            min_video_height: config.resolver.min_video_height,
            max_upload_bytes: config.delivery.max_upload_bytes.as_u64(),
            temp_dir: config.resolver.temp_dir.clone(),
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Terminal state of a successfully handled event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Welcomed,
    OffersShown { choices: usize },
    Delivered { size: u64, via_fallback: bool },
}

struct DownloadJob {
    url: String,
    platform: Platform,
    selection: FormatSelection,
}

/// Per-event state machine tying the resolver, dispatcher, selection cache
/// and transport together.
///
/// Every failure is caught in [`handle`](Self::handle) and turned into a
/// user-facing message; nothing propagates past it.
#[derive(Builder)]
pub struct Orchestrator {
    resolver: Arc<dyn MediaResolver>,
    transport: Arc<dyn ChatTransport>,
    users: Arc<dyn UserDirectory>,
    dispatcher: Dispatcher,
    selections: Arc<SelectionCache>,
    #[builder(default)]
    metrics: Arc<Metrics>,
    #[builder(default)]
    tools: ToolReport,
    #[builder(default)]
    settings: FlowSettings,
}

impl Orchestrator {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn selections(&self) -> &Arc<SelectionCache> {
        &self.selections
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Handle one inbound event to completion, within `handler_timeout`
    pub async fn handle(&self, event: InboundEvent) {
        let chat_id = event.chat_id();
        let callback_id = match &event {
            InboundEvent::Callback { callback_id, .. } => Some(callback_id.clone()),
            _ => None,
        };

        let limit = self.settings.handler_timeout;
        // a download still queued when this gives up is skipped by the dispatcher
        let result = tokio::time::timeout(limit, self.route(event))
            .await
            .unwrap_or_else(|_| Err(FlowError::TimedOut(limit)));

        match result {
            Ok(outcome) => debug!(chat_id, ?outcome, "Event handled"),
            Err(err) => self.report(chat_id, callback_id.as_deref(), &err).await,
        }
    }

    async fn route(&self, event: InboundEvent) -> Result<FlowOutcome, FlowError> {
        match event {
            InboundEvent::Start { chat_id, user } => self.handle_start(chat_id, &user).await,
            InboundEvent::Text {
                chat_id,
                user,
                text,
            } => self.handle_text(chat_id, &user, &text).await,
            InboundEvent::Callback {
                callback_id,
                chat_id,
                user,
                data,
            } => {
                self.handle_selection(&callback_id, chat_id, &user, &data)
                    .await
            }
        }
    }

    async fn report(&self, chat_id: ChatId, callback_id: Option<&str>, err: &FlowError) {
        if err.is_user_side() {
            info!(chat_id, error = %err, "Request rejected");
        } else {
            self.metrics.failed();
            warn!(chat_id, error = %err, "Request failed");
        }

        let message = err.user_message();
        let sent = match callback_id {
            Some(id) if err.is_alert() => self.transport.answer_callback(id, &message, true).await,
            _ => self
                .transport
                .notify(chat_id, &message, TextFormat::Plain)
                .await
                .map(|_| ()),
        };

        if let Err(e) = sent {
            warn!(chat_id, error = %e, "Could not report failure to user");
        }
    }

    /// `/start`: remember the user, then greet
    pub async fn handle_start(
        &self,
        chat_id: ChatId,
        user: &ChatUser,
    ) -> Result<FlowOutcome, FlowError> {
        info!(chat_id, user = %user.handle(), "Start");
        self.remember_user(user).await;

        let text = captions::welcome_text(
            user.first_name.as_deref().unwrap_or("friend"),
            self.tools.impersonation,
            self.tools.has_cookies(Platform::Instagram),
        );
        self.transport
            .notify(chat_id, &text, TextFormat::Html)
            .await?;

        Ok(FlowOutcome::Welcomed)
    }

    /// Directory failures are logged and never block the greeting
    async fn remember_user(&self, user: &ChatUser) {
        match self.users.get_user(user.id).await {
            Ok(None) => {
                let profile = UserProfile::new(user.id, user.username.clone(), user.first_name.clone());
                match self.users.create_user(profile).await {
                    Ok(()) => info!(user_id = user.id, "New user"),
                    Err(e) => warn!(user_id = user.id, error = %e, "Could not create user"),
                }
            }
            Ok(Some(_)) => {
                let update = ProfileUpdate {
                    username: user.username.clone(),
                    first_name: user.first_name.clone(),
                    ..Default::default()
                };
                if let Err(e) = self.users.update_user(user.id, update).await {
                    warn!(user_id = user.id, error = %e, "Could not update user");
                }
            }
            Err(e) => warn!(user_id = user.id, error = %e, "User lookup failed"),
        }
    }

    /// A link was sent: resolve, then offer choices or fall back
    pub async fn handle_text(
        &self,
        chat_id: ChatId,
        user: &ChatUser,
        text: &str,
    ) -> Result<FlowOutcome, FlowError> {
        let text = text.trim();
        if !looks_like_url(text) {
            return Err(FlowError::InvalidUrl);
        }

        let url = clean_url(text);
        let platform = Platform::detect(&url);
        self.metrics.link_received();
        info!(chat_id, %platform, %url, user = %user.handle(), "Link received");

        if let Err(e) = self
            .transport
            .send_chat_action(chat_id, ChatAction::Typing)
            .await
        {
            debug!(chat_id, error = %e, "Chat action failed");
        }
        let checking = self
            .transport
            .notify(chat_id, "🔎 Checking...", TextFormat::Plain)
            .await?;

        let resolved = self.resolve_with_retry(&url, platform).await;
        self.forget_message(chat_id, checking).await;

        let media = match resolved {
            Ok(media) => media,
            Err(reason) => {
                warn!(chat_id, %platform, error = %reason, "Falling back to direct download");
                return self.direct_fallback(chat_id, &url, platform).await;
            }
        };

        let offers = select_offers(
            &media,
            self.settings.max_video_variants,
            self.settings.min_video_height,
        );
        if !offers.has_video() {
            let reason = FlowError::NoUsableFormat;
            info!(
                chat_id,
                %platform,
                formats = media.formats.len(),
                %reason,
                "Falling back to direct download"
            );
            return self.direct_fallback(chat_id, &url, platform).await;
        }

        self.show_offers(chat_id, &url, platform, &media, &offers)
            .await
    }

    /// Metadata lookup with doubling backoff between attempts
    async fn resolve_with_retry(
        &self,
        url: &str,
        platform: Platform,
    ) -> Result<ResolvedMedia, FlowError> {
        let attempts = self.settings.info_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self
                .resolver
                .resolve(url, platform, self.settings.info_timeout)
                .await
            {
                Ok(media) => return Ok(media),
                Err(e) if attempt < attempts => {
                    let backoff = retry_backoff(self.settings.retry_base_delay, attempt);
                    warn!(%platform, attempt, attempts, ?backoff, error = %e, "Metadata lookup failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
                Err(source) => {
                    return Err(FlowError::ResolutionFailed { attempts, source });
                }
            }
        }
    }

    async fn show_offers(
        &self,
        chat_id: ChatId,
        url: &str,
        platform: Platform,
        media: &ResolvedMedia,
        offers: &Offers,
    ) -> Result<FlowOutcome, FlowError> {
        let choices: Vec<Choice> = offers
            .iter()
            .map(|offer| {
                let token = new_token();
                let entry = SelectionEntry::builder()
                    .source_url(url)
                    .format_id(offer.format_id.as_str())
                    .media_kind(offer.media_kind)
                    .title(media.display_title())
                    .maybe_uploader(media.uploader.clone())
                    .platform(platform)
                    .build();
                self.selections.put(token.clone(), entry);

                Choice {
                    label: offer.button_label(),
                    token,
                }
            })
            .collect();

        self.transport
            .offer_choices(
                chat_id,
                &captions::offer_text(media),
                media.thumbnail_url.as_deref(),
                &choices,
            )
            .await?;

        self.metrics.offers_shown();
        info!(chat_id, %platform, choices = choices.len(), "Offers shown");

        Ok(FlowOutcome::OffersShown {
            choices: choices.len(),
        })
    }

    /// A choice button was pressed
    pub async fn handle_selection(
        &self,
        callback_id: &str,
        chat_id: ChatId,
        user: &ChatUser,
        token: &str,
    ) -> Result<FlowOutcome, FlowError> {
        let Some(entry) = self.selections.get(token) else {
            self.metrics.selection_expired();
            return Err(FlowError::SelectionExpired);
        };
        self.admit()?;

        info!(
            chat_id,
            user = %user.handle(),
            kind = %entry.media_kind,
            format = %entry.format_id,
            "Selection picked"
        );

        if let Err(e) = self
            .transport
            .answer_callback(callback_id, "⏳ Downloading...", false)
            .await
        {
            debug!(chat_id, error = %e, "Callback answer failed");
        }
        if let Err(e) = self
            .transport
            .send_chat_action(chat_id, ChatAction::for_kind(entry.media_kind))
            .await
        {
            debug!(chat_id, error = %e, "Chat action failed");
        }

        let (artifact, size) = self
            .download(DownloadJob {
                url: entry.source_url.clone(),
                platform: entry.platform,
                selection: FormatSelection::Exact {
                    format_id: entry.format_id.clone(),
                    kind: entry.media_kind,
                },
            })
            .await?;

        let caption = captions::delivery_caption(
            entry.media_kind,
            &entry.title,
            entry.uploader.as_deref(),
            size,
            &self.settings.bot_username,
        );
        let (title, performer) = match entry.media_kind {
            MediaKind::Audio => (
                Some(entry.title.clone()),
                Some(entry.uploader.clone().unwrap_or_else(|| "Unknown".into())),
            ),
            MediaKind::Video => (None, None),
        };

        let delivery = FileDelivery {
            chat_id,
            path: artifact.path().to_path_buf(),
            media_kind: entry.media_kind,
            caption,
            title,
            performer,
        };
        self.deliver(artifact, delivery).await?;
        info!(chat_id, size, "Delivered");

        Ok(FlowOutcome::Delivered {
            size,
            via_fallback: false,
        })
    }

    /// Best combined stream, no per-variant choice
    async fn direct_fallback(
        &self,
        chat_id: ChatId,
        url: &str,
        platform: Platform,
    ) -> Result<FlowOutcome, FlowError> {
        self.metrics.fallback_started();
        self.admit()?;

        let queued = self.dispatcher.queue_depth();
        let active = self.dispatcher.active_count();
        info!(chat_id, %platform, queued, active, "Direct download");

        let status = self
            .transport
            .notify(chat_id, &captions::queue_status(queued, active), TextFormat::Plain)
            .await
            .ok();

        let downloaded = self
            .download(DownloadJob {
                url: url.to_string(),
                platform,
                selection: FormatSelection::BestEffort,
            })
            .await;

        if let Some(message_id) = status {
            self.forget_message(chat_id, message_id).await;
        }
        let (artifact, size) = downloaded?;

        let delivery = FileDelivery {
            chat_id,
            path: artifact.path().to_path_buf(),
            media_kind: MediaKind::Video,
            caption: captions::direct_caption(platform, size, &self.settings.bot_username),
            title: None,
            performer: None,
        };
        self.deliver(artifact, delivery).await?;
        info!(chat_id, size, "Delivered");

        Ok(FlowOutcome::Delivered {
            size,
            via_fallback: true,
        })
    }

    /// Reject new work while too much is already waiting
    fn admit(&self) -> Result<(), FlowError> {
        let depth = self.dispatcher.queue_depth();
        if depth > self.settings.queue_reject_threshold {
            self.metrics.queue_saturated();
            warn!(depth, threshold = self.settings.queue_reject_threshold, "Queue saturated");
            return Err(FlowError::QueueSaturated { depth });
        }
        Ok(())
    }

    /// Run one download through the dispatcher and check the artifact's size.
    ///
    /// The artifact is created inside the task, so a failed, timed out or
    /// abandoned task removes its own files.
    async fn download(&self, job: DownloadJob) -> Result<(TempArtifact, u64), FlowError> {
        let DownloadJob {
            url,
            platform,
            selection,
        } = job;
        let kind = selection.media_kind();
        let resolver = self.resolver.clone();
        let temp_dir = self.settings.temp_dir.clone();
        let timeout = self.settings.download_timeout;

        // the caller may have awaited the transport since its first check
        self.admit()?;
        let handle = self
            .dispatcher
            .submit_with_timeout(timeout + TIMEOUT_GRACE, move || async move {
                let artifact = TempArtifact::new(&temp_dir, kind);
                let request = DownloadRequest::builder()
                    .url(url)
                    .platform(platform)
                    .selection(selection)
                    .output(artifact.path())
                    .build();

                resolver.download(&request, timeout).await?;
                Ok::<_, ResolverError>(artifact)
            });

        if let Some(position) = handle.queue_position() {
            debug!(%platform, position, "Download queued");
        }

        let mut artifact = handle
            .await
            .map_err(|e| self.download_error(e, platform))?;

        let size = match artifact.size().await {
            Ok(size) => size,
            Err(e) => {
                self.cleanup(&mut artifact).await;
                return Err(self.download_error(DispatchError::Failed(e.into()), platform));
            }
        };

        let limit = self.settings.max_upload_bytes;
        if size > limit {
            self.cleanup(&mut artifact).await;
            return Err(FlowError::OversizedOutput { size, limit });
        }

        Ok((artifact, size))
    }

    fn download_error(&self, err: DispatchError<ResolverError>, platform: Platform) -> FlowError {
        let kind = match &err {
            DispatchError::Failed(e) => e.failure_kind(),
            _ => FailureKind::Generic,
        };

        FlowError::DownloadFailed {
            kind,
            platform,
            cookies_present: self.tools.has_cookies(platform),
            message: err.to_string(),
        }
    }

    /// Send the file, then remove it whatever the transport reported
    async fn deliver(
        &self,
        mut artifact: TempArtifact,
        delivery: FileDelivery,
    ) -> Result<(), FlowError> {
        let sent = self.transport.deliver_file(&delivery).await;
        self.cleanup(&mut artifact).await;
        sent?;

        self.metrics.delivered();
        Ok(())
    }

    async fn cleanup(&self, artifact: &mut TempArtifact) {
        match artifact.remove().await {
            Ok(files) => debug!(files, path = %artifact.path().display(), "Temp files removed"),
            Err(e) => warn!(path = %artifact.path().display(), error = %e, "Temp cleanup failed"),
        }
    }

    async fn forget_message(&self, chat_id: ChatId, message_id: MessageId) {
        if let Err(e) = self.transport.delete_message(chat_id, message_id).await {
            debug!(chat_id, message_id, error = %e, "Could not delete status message");
        }
    }
}

/// Delay after failed attempt `attempt` (1-based): the base delay, doubled
/// each time, saturating instead of overflowing
fn retry_backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff_doubles() {
        let base = Duration::from_millis(2000);
        assert_eq!(retry_backoff(base, 1), Duration::from_millis(2000));
        assert_eq!(retry_backoff(base, 2), Duration::from_millis(4000));
        assert_eq!(retry_backoff(base, 3), Duration::from_millis(8000));
    }

    #[test]
    fn test_retry_backoff_saturates() {
        let base = Duration::from_millis(2000);
        assert_eq!(retry_backoff(base, 40), base.saturating_mul(u32::MAX));
        assert_eq!(retry_backoff(Duration::MAX, 5), Duration::MAX);
    }

    #[test]
    fn test_settings_follow_config() {
        let mut config = Config::default();
        config.bot.handler_timeout_secs = 42;
        config.dispatcher.queue_reject_threshold = 9;

        let settings = FlowSettings::from_config(&config);
        assert_eq!(settings.handler_timeout, Duration::from_secs(42));
        assert_eq!(settings.queue_reject_threshold, 9);
    }
}
