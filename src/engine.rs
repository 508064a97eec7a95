//! Request lifecycle engine
//!
//! Owns the request entity and its transitions: candidate resolution,
//! randomized selection, persistence, and timeout handling. Every handler
//! reloads fresh state from the store and guard-checks it before mutating,
//! so stale or duplicate deliveries (an old timer firing after a response
//! already arrived) fall through without side effects. Concurrent valid
//! events for the same request are resolved last-write-wins; the guard
//! only has to detect staleness, not serialize writers.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::try_join_all;
use rand::Rng;
use uuid::Uuid;

use crate::chat::{Directory, Messenger, Notice};
use crate::error::{DirectoryError, Result};
use crate::messages;
use crate::models::Request;
use crate::scheduler::Scheduler;
use crate::store::Store;

/// Policy knobs for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Smallest pool that lets a request start
    pub min_initial_candidates: usize,
    /// Smallest pool that keeps a request going after a reject or timeout
    pub min_retry_candidates: usize,
    /// Send a "too late" note to responders who are not the pending
    /// candidate instead of staying silent
    pub notify_late_responder: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_initial_candidates: 2,
            min_retry_candidates: 1,
            notify_late_responder: false,
        }
    }
}

/// Coordinates one request at a time per candidate: resolve the pool,
/// offer the task to a random member, and react to accept/reject/timeout.
pub struct Engine {
    store: Store,
    directory: Arc<dyn Directory>,
    messenger: Arc<dyn Messenger>,
    scheduler: Scheduler,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Store,
        directory: Arc<dyn Directory>,
        messenger: Arc<dyn Messenger>,
        scheduler: Scheduler,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            directory,
            messenger,
            scheduler,
            config,
        })
    }

    /// Start a new request: parse the command text, resolve the candidate
    /// pool, and offer the task to the first pick. Nothing is persisted
    /// when the pool is too small to start.
    pub async fn begin(self: Arc<Self>, raw_text: &str, requester: &str, channel: &str) -> Result<()> {
        let request = Request::parse(raw_text, requester, channel);
        tracing::info!(requester, channel, task = %request.task_text, "new request");

        let pool = match self.resolve_pool(&request).await {
            Ok(pool) => pool,
            Err(e) => return self.report_directory_failure(&request, e).await,
        };

        if pool.len() < self.config.min_initial_candidates {
            tracing::info!(requester, pool = pool.len(), "not enough candidates to start");
            self.messenger
                .send_private(
                    channel,
                    requester,
                    Notice::new(messages::pick(messages::NOT_ENOUGH_RECIPIENTS))
                        .quote(&request.task_text),
                )
                .await;
            return Ok(());
        }

        self.messenger
            .send_private(
                channel,
                requester,
                Notice::new(messages::pick(messages::ACK)).quote(&request.task_text),
            )
            .await;

        self.contact_next(request, pool).await
    }

    /// A candidate's response window lapsed. Absent request or a pending
    /// candidate other than the expected one means a response won the
    /// race; the timer is stale and must change nothing.
    pub async fn on_timeout(self: Arc<Self>, id: Uuid, expected_pending: &str) -> Result<()> {
        let Some(mut request) = self.store.get(id).await? else {
            tracing::debug!(%id, "timer fired for a finished or expired request");
            return Ok(());
        };
        if request.pending.as_deref() != Some(expected_pending) {
            tracing::debug!(%id, expected_pending, "stale timer ignored");
            return Ok(());
        }

        tracing::info!(%id, user = expected_pending, "candidate timed out");
        request.timed_out.insert(expected_pending.to_string());
        request.pending = None;
        self.messenger
            .send_private(
                &request.channel,
                expected_pending,
                Notice::new(messages::pick(messages::TIMEOUT)).quote(&request.task_text),
            )
            .await;

        self.advance(request).await
    }

    /// The pending candidate declined; move on to the next one.
    pub async fn on_reject(
        self: Arc<Self>,
        id: Uuid,
        responder: &str,
        channel: &str,
        requester: &str,
    ) -> Result<()> {
        let Some(mut request) = self.store.get(id).await? else {
            return self.report_expired(channel, requester, responder).await;
        };
        if request.pending.as_deref() != Some(responder) {
            return self.dismiss_late_responder(&request, responder).await;
        }

        tracing::info!(%id, user = responder, "candidate rejected");
        request.rejected.insert(responder.to_string());
        request.pending = None;
        self.messenger
            .send_private(
                &request.channel,
                responder,
                Notice::new(messages::pick(messages::REJECT_ACK)),
            )
            .await;

        self.advance(request).await
    }

    /// The pending candidate accepted; announce it and finish. Deletion is
    /// the terminal transition: timers firing afterwards find nothing.
    pub async fn on_accept(
        self: Arc<Self>,
        id: Uuid,
        responder: &str,
        channel: &str,
        requester: &str,
    ) -> Result<()> {
        let Some(request) = self.store.get(id).await? else {
            return self.report_expired(channel, requester, responder).await;
        };
        if request.pending.as_deref() != Some(responder) {
            return self.dismiss_late_responder(&request, responder).await;
        }

        tracing::info!(%id, user = responder, "request accepted");
        self.messenger
            .send_public(
                &request.channel,
                Notice::new(format!(
                    "<@{}> accepted <@{}>'s request to:",
                    responder, request.requester
                ))
                .quote(&request.task_text),
            )
            .await;
        self.messenger
            .send_private(
                &request.channel,
                responder,
                Notice::new(messages::pick(messages::ACCEPT_THANKS)),
            )
            .await;

        self.store.delete(id).await
    }

    /// Compute the currently eligible pool. Directory state is queried
    /// fresh on every call; group membership and presence change over the
    /// life of a request and are deliberately not cached.
    async fn resolve_pool(
        &self,
        request: &Request,
    ) -> std::result::Result<BTreeSet<String>, DirectoryError> {
        let mut candidates = request.user_refs.clone();

        for group_id in &request.group_refs {
            candidates.extend(self.directory.resolve_group(group_id).await?);
        }

        let members = self.directory.channel_members(&request.channel).await?;
        if request.broadcast {
            candidates.extend(members);
        } else {
            candidates.retain(|user| members.contains(user));
        }

        candidates.remove(&request.requester);

        let checks = try_join_all(candidates.iter().map(|user| async move {
            let active = self.directory.is_active(user).await?;
            Ok::<_, DirectoryError>((user, active))
        }))
        .await?;

        let mut pool: BTreeSet<String> = checks
            .into_iter()
            .filter(|(_, active)| *active)
            .map(|(user, _)| user.clone())
            .collect();

        for user in request.timed_out.iter().chain(request.rejected.iter()) {
            pool.remove(user);
        }

        Ok(pool)
    }

    /// After a reject or timeout: re-resolve against current directory
    /// state and either offer the task to the next candidate or give up.
    async fn advance(self: Arc<Self>, request: Request) -> Result<()> {
        let pool = match self.resolve_pool(&request).await {
            Ok(pool) => pool,
            Err(e) => return self.report_directory_failure(&request, e).await,
        };

        if pool.len() < self.config.min_retry_candidates {
            return self.abort(request).await;
        }

        self.contact_next(request, pool).await
    }

    /// Offer the task to one candidate picked uniformly at random:
    /// persist first (the buttons embed the id), then message, then arm
    /// the response timeout.
    async fn contact_next(self: Arc<Self>, mut request: Request, pool: BTreeSet<String>) -> Result<()> {
        let Some(candidate) = pick_random(&pool) else {
            return self.abort(request).await;
        };

        request.pending = Some(candidate.clone());
        let id = self.store.put(&mut request).await?;

        let callback_id = format!("{}:{}", id, request.requester);
        self.messenger
            .send_private(
                &request.channel,
                &candidate,
                Notice::new(format!(
                    "<@{}>, <@{}> has asked you to:",
                    candidate, request.requester
                ))
                .quote(&request.task_text)
                .with_prompt(callback_id, messages::pick(messages::CALL_TO_ACTION)),
            )
            .await;

        tracing::info!(%id, user = %candidate, "offer sent");
        self.arm_timeout(id, candidate);
        Ok(())
    }

    /// Schedule the response timeout for the candidate just contacted.
    /// Timers are never cancelled; a superseded one fails the guard check
    /// when it fires.
    fn arm_timeout(self: Arc<Self>, id: Uuid, candidate: String) {
        let scheduler = self.scheduler.clone();
        scheduler.arm(async move {
            if let Err(e) = self.on_timeout(id, &candidate).await {
                tracing::error!(%id, "timeout handling failed: {}", e);
            }
        });
    }

    /// Terminal: tell the requester who was asked, then drop the request.
    async fn abort(&self, request: Request) -> Result<()> {
        tracing::info!(
            requester = %request.requester,
            rejected = request.rejected.len(),
            timed_out = request.timed_out.len(),
            "no candidates left, aborting"
        );

        let mut notice =
            Notice::new(messages::pick(messages::ABORT)).quote(&request.task_text);
        if !request.rejected.is_empty() {
            notice = notice.quote(format!("Declined: {}", mention_list(&request.rejected)));
        }
        if !request.timed_out.is_empty() {
            notice = notice.quote(format!(
                "Never answered: {}",
                mention_list(&request.timed_out)
            ));
        }
        self.messenger
            .send_private(&request.channel, &request.requester, notice)
            .await;

        match request.id {
            Some(id) => self.store.delete(id).await,
            None => Ok(()),
        }
    }

    /// The request expired (or finished) before this response arrived;
    /// both sides deserve to know.
    async fn report_expired(&self, channel: &str, requester: &str, responder: &str) -> Result<()> {
        self.messenger
            .send_private(
                channel,
                requester,
                Notice::new(messages::pick(messages::EXPIRED_REQUESTER)),
            )
            .await;
        self.messenger
            .send_private(
                channel,
                responder,
                Notice::new(messages::pick(messages::EXPIRED_RESPONDER)),
            )
            .await;
        Ok(())
    }

    /// A response from someone who is not the pending candidate.
    async fn dismiss_late_responder(&self, request: &Request, responder: &str) -> Result<()> {
        tracing::debug!(responder, "response from a non-pending user ignored");
        if self.config.notify_late_responder {
            self.messenger
                .send_private(
                    &request.channel,
                    responder,
                    Notice::new(messages::pick(messages::TOO_LATE)),
                )
                .await;
        }
        Ok(())
    }

    async fn report_directory_failure(&self, request: &Request, err: DirectoryError) -> Result<()> {
        tracing::warn!(channel = %request.channel, "candidate resolution failed: {}", err);
        self.messenger
            .send_private(
                &request.channel,
                &request.requester,
                Notice::new(messages::pick(messages::DIRECTORY_ERROR)).quote(err.to_string()),
            )
            .await;
        Ok(())
    }
}

fn pick_random(pool: &BTreeSet<String>) -> Option<String> {
    if pool.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..pool.len());
    pool.iter().nth(index).cloned()
}

fn mention_list(users: &BTreeSet<String>) -> String {
    users
        .iter()
        .map(|user| format!("<@{}>", user))
        .collect::<Vec<_>>()
        .join(", ")
}
