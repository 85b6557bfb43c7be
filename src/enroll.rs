//! Automatic enrollment into free courses.
//!
//! One browser session, one target at a time. Each target runs through a
//! small state machine: detect whether the course is already owned, paid, or
//! free-enrollable, then click through the one- or two-step enrollment flow
//! and classify the result. Every target ends in exactly one terminal bucket
//! and appends exactly one ledger entry; slugs the ledger already settles are
//! skipped without any navigation.

use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::browser::driver::PageDriver;
use crate::browser::manager::BrowserError;
use crate::config::EnrollConfig;
use crate::error::FatalError;
use crate::ledger::{entry_now, Ledger};
use crate::models::{AcquisitionOutcome, AcquisitionTarget, RunSummary};

/// Poll interval while watching for a post-click navigation.
const URL_POLL: Duration = Duration::from_millis(250);

/// What the course page says about the viewer's relationship to the course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    /// The course is already in the account ("go to course" affordance).
    Owned,
    /// The course is not free.
    Paid,
    /// The free-enroll affordance is displayed and enabled.
    Enrollable,
}

/// Narrow page-interaction surface the state machine drives.
///
/// The browser implementation is [`BrowserEnrollPage`]; tests script a fake.
pub trait EnrollPage {
    fn open(&mut self, url: &str) -> Result<(), BrowserError>;

    /// One observation of the page. `Ok(None)` means none of the known
    /// signals are visible right now.
    fn detect_signal(&mut self) -> Result<Option<PageSignal>, BrowserError>;

    /// Click the free-enroll affordance. `Ok(false)` when it is not
    /// clickable at this moment.
    fn click_enroll(&mut self) -> Result<bool, BrowserError>;

    /// Click the confirmation affordance on the checkout page.
    fn click_confirm(&mut self) -> Result<bool, BrowserError>;

    fn current_url(&mut self) -> String;
}

/// URL pattern marking a one-step enrollment that completed on the first
/// click.
pub const SUBSCRIBE_SUCCESS_PATTERN: &str = "/cart/subscribe/course/";

/// URL pattern marking a completed two-step checkout.
pub const CHECKOUT_SUCCESS_PATTERN: &str = "/cart/success/";

/// Drives the acquisition state machine over a batch of targets.
pub struct Enroller<'a, P: EnrollPage> {
    page: P,
    ledger: &'a mut dyn Ledger,
    config: EnrollConfig,
    cancel: Arc<AtomicBool>,
}

impl<'a, P: EnrollPage> Enroller<'a, P> {
    pub fn new(page: P, ledger: &'a mut dyn Ledger, config: EnrollConfig) -> Self {
        Self::with_cancel(page, ledger, config, Arc::new(AtomicBool::new(false)))
    }

    /// `cancel` is flipped by the operator's interrupt handler; it is checked
    /// between targets and inside page-wait loops.
    pub fn with_cancel(
        page: P,
        ledger: &'a mut dyn Ledger,
        config: EnrollConfig,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            page,
            ledger,
            config,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Process targets in input order. Per-target failures are contained;
    /// only ledger storage errors propagate. Cancellation stops before the
    /// next target and returns the counts accumulated so far.
    pub fn run(&mut self, targets: &[AcquisitionTarget]) -> Result<RunSummary, FatalError> {
        let mut summary = RunSummary::default();
        log::info!("enrolling {} target(s)", targets.len());

        for target in targets {
            if self.cancelled() {
                log::warn!("enrollment cancelled, returning partial counts");
                break;
            }
            if let Some(prior) = self.ledger.has_terminal_outcome(&target.slug)? {
                if prior.is_settled() {
                    log::info!(
                        "skipping {} (already {} per ledger)",
                        target.slug,
                        prior.as_str()
                    );
                    summary.record_skipped(prior);
                    continue;
                }
            }

            let outcome = self.process(target);
            log::info!("{} => {}", target.slug, outcome.as_str());
            self.ledger.append(&entry_now(&target.slug, outcome))?;
            summary.record(outcome);
        }

        log::info!(
            "enrollment finished: {} acquired, {} owned, {} paid, {} unavailable, {} failed, {} skipped",
            summary.acquired,
            summary.owned,
            summary.paid,
            summary.unavailable,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Carry one target from `Start` to its terminal state.
    fn process(&mut self, target: &AcquisitionTarget) -> AcquisitionOutcome {
        // Start: load the course page.
        if let Err(e) = self.open_with_retries(&target.canonical_url) {
            log::warn!("could not open {}: {}", target.canonical_url, e);
            return AcquisitionOutcome::Failed;
        }

        // Start -> Owned | Paid | Enrolling | Unavailable
        let signal = match self.detect_with_retries() {
            Ok(Some(signal)) => signal,
            Ok(None) => {
                log::warn!(
                    "no ownership/price/enroll signal on {} (private or removed?)",
                    target.canonical_url
                );
                return AcquisitionOutcome::Unavailable;
            }
            Err(e) => {
                log::warn!("detection failed for {}: {}", target.canonical_url, e);
                return AcquisitionOutcome::Failed;
            }
        };

        match signal {
            PageSignal::Owned => AcquisitionOutcome::Owned,
            PageSignal::Paid => AcquisitionOutcome::Paid,
            PageSignal::Enrollable => self.enroll(target),
        }
    }

    /// Enrolling -> Acquired | Failed.
    fn enroll(&mut self, target: &AcquisitionTarget) -> AcquisitionOutcome {
        if !self.click_with_retries(ClickStep::Enroll) {
            log::warn!("enroll affordance never clickable on {}", target.canonical_url);
            return AcquisitionOutcome::Failed;
        }

        // Some courses complete in one step: the first click lands straight
        // on the subscription-success page.
        let grace = self.config.timeout() / 3;
        if self.url_matches_within(SUBSCRIBE_SUCCESS_PATTERN, grace) {
            log::info!("one-step enrollment for {}", target.slug);
            return AcquisitionOutcome::Acquired;
        }

        // Otherwise a second, distinctly located affordance confirms.
        if !self.click_with_retries(ClickStep::Confirm) {
            log::warn!("confirm affordance never clickable on {}", target.canonical_url);
            return AcquisitionOutcome::Failed;
        }
        if self.url_matches_within(CHECKOUT_SUCCESS_PATTERN, self.config.timeout()) {
            AcquisitionOutcome::Acquired
        } else {
            log::warn!(
                "post-confirmation navigation never reached success for {}",
                target.canonical_url
            );
            AcquisitionOutcome::Failed
        }
    }

    fn open_with_retries(&mut self, url: &str) -> Result<(), BrowserError> {
        let mut last = None;
        for attempt in 1..=self.config.retries.max(1) {
            match self.page.open(url) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!("attempt {}: open {} failed: {}", attempt, url, e);
                    last = Some(e);
                    self.backoff();
                }
            }
        }
        Err(last.unwrap_or_else(|| BrowserError::Navigation(url.to_string())))
    }

    /// Retry signal detection with randomized backoff to absorb page-load
    /// latency. `Ok(None)` only after the full budget saw nothing.
    fn detect_with_retries(&mut self) -> Result<Option<PageSignal>, BrowserError> {
        let mut last_error = None;
        for _ in 0..self.config.retries.max(1) {
            match self.page.detect_signal() {
                Ok(Some(signal)) => return Ok(Some(signal)),
                Ok(None) => last_error = None,
                Err(e) => last_error = Some(e),
            }
            self.backoff();
        }
        match last_error {
            // Budget ended on a transient error: the step failed.
            Some(e) => Err(e),
            // Budget ended on a clean observation of "nothing there".
            None => Ok(None),
        }
    }

    fn click_with_retries(&mut self, step: ClickStep) -> bool {
        for _ in 0..self.config.retries.max(1) {
            let clicked = match step {
                ClickStep::Enroll => self.page.click_enroll(),
                ClickStep::Confirm => self.page.click_confirm(),
            };
            match clicked {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => log::debug!("{:?} click failed: {}", step, e),
            }
            self.backoff();
        }
        false
    }

    fn url_matches_within(&mut self, pattern: &str, wait: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.page.current_url().contains(pattern) {
                return true;
            }
            if self.cancelled() || start.elapsed() >= wait {
                return false;
            }
            std::thread::sleep(URL_POLL.min(wait));
        }
    }

    fn backoff(&self) {
        if self.cancelled() {
            return;
        }
        let base = self.config.backoff_base_ms.max(1);
        let pause = rand::thread_rng().gen_range(base..=base * 3);
        std::thread::sleep(Duration::from_millis(pause));
    }
}

#[derive(Debug, Clone, Copy)]
enum ClickStep {
    Enroll,
    Confirm,
}

// Course-page selectors. Configuration data for the browser implementation,
// not part of the state machine itself.
const GO_TO_COURSE_SELECTOR: &str = "[data-purpose='go-to-course']";
const ENROLL_BUTTON_SELECTOR: &str = "button[data-purpose='buy-this-course-button']";
const ENROLL_BUTTON_TEXT: &str = "Enroll now";
const CONFIRM_BUTTON_SELECTOR: &str = "button[data-purpose='checkout-button']";

/// [`EnrollPage`] over a real browser tab.
pub struct BrowserEnrollPage {
    driver: PageDriver,
}

impl BrowserEnrollPage {
    pub fn new(driver: PageDriver) -> Self {
        Self { driver }
    }
}

impl EnrollPage for BrowserEnrollPage {
    fn open(&mut self, url: &str) -> Result<(), BrowserError> {
        self.driver.navigate(url)
    }

    fn detect_signal(&mut self) -> Result<Option<PageSignal>, BrowserError> {
        if self.driver.is_displayed_enabled(GO_TO_COURSE_SELECTOR)? {
            return Ok(Some(PageSignal::Owned));
        }
        if self.driver.is_displayed_enabled(ENROLL_BUTTON_SELECTOR)? {
            // The same button slot is used for paid checkout; only the
            // "Enroll now" labelling marks the free flow.
            if self
                .driver
                .selector_has_text(ENROLL_BUTTON_SELECTOR, ENROLL_BUTTON_TEXT)?
            {
                return Ok(Some(PageSignal::Enrollable));
            }
            return Ok(Some(PageSignal::Paid));
        }
        Ok(None)
    }

    fn click_enroll(&mut self) -> Result<bool, BrowserError> {
        self.driver.click_if_present(ENROLL_BUTTON_SELECTOR)
    }

    fn click_confirm(&mut self) -> Result<bool, BrowserError> {
        self.driver.click_if_present(CONFIRM_BUTTON_SELECTOR)
    }

    fn current_url(&mut self) -> String {
        self.driver.current_url()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    /// Scripted page: fixed signal, scripted click results, and a URL that
    /// changes as clicks land.
    struct FakePage {
        signal: Option<PageSignal>,
        signal_error: bool,
        enroll_clickable: bool,
        confirm_clickable: bool,
        one_step: bool,
        url: String,
        cancel_on_open: Option<Arc<AtomicBool>>,
        opens: usize,
        enroll_clicks: usize,
        confirm_clicks: usize,
        detects: usize,
    }

    impl FakePage {
        fn with_signal(signal: Option<PageSignal>) -> Self {
            Self {
                signal,
                signal_error: false,
                enroll_clickable: true,
                confirm_clickable: true,
                one_step: false,
                url: "https://target.example/course/abc".to_string(),
                cancel_on_open: None,
                opens: 0,
                enroll_clicks: 0,
                confirm_clicks: 0,
                detects: 0,
            }
        }
    }

    impl EnrollPage for FakePage {
        fn open(&mut self, url: &str) -> Result<(), BrowserError> {
            self.opens += 1;
            self.url = url.to_string();
            if let Some(flag) = &self.cancel_on_open {
                flag.store(true, Ordering::Relaxed);
            }
            Ok(())
        }

        fn detect_signal(&mut self) -> Result<Option<PageSignal>, BrowserError> {
            self.detects += 1;
            if self.signal_error {
                return Err(BrowserError::Timeout("detect".into()));
            }
            Ok(self.signal)
        }

        fn click_enroll(&mut self) -> Result<bool, BrowserError> {
            self.enroll_clicks += 1;
            if self.enroll_clickable {
                self.url = if self.one_step {
                    "https://target.example/cart/subscribe/course/123/".to_string()
                } else {
                    "https://target.example/payment/checkout/".to_string()
                };
            }
            Ok(self.enroll_clickable)
        }

        fn click_confirm(&mut self) -> Result<bool, BrowserError> {
            self.confirm_clicks += 1;
            if self.confirm_clickable {
                self.url = "https://target.example/cart/success/?x=1".to_string();
            }
            Ok(self.confirm_clickable)
        }

        fn current_url(&mut self) -> String {
            self.url.clone()
        }
    }

    fn fast_config() -> EnrollConfig {
        EnrollConfig {
            retries: 3,
            timeout_secs: 1,
            headless: true,
            backoff_base_ms: 1,
        }
    }

    fn target(slug: &str) -> AcquisitionTarget {
        AcquisitionTarget {
            canonical_url: format!("https://target.example/course/{slug}?couponCode=X"),
            slug: slug.to_string(),
        }
    }

    #[test]
    fn test_owned_course_records_without_clicking() {
        let page = FakePage::with_signal(Some(PageSignal::Owned));
        let mut ledger = MemoryLedger::new();
        let mut enroller = Enroller::new(page, &mut ledger, fast_config());

        let summary = enroller.run(&[target("abc")]).unwrap();
        assert_eq!(summary.owned, 1);
        assert_eq!(summary.total(), 1);
        assert_eq!(enroller.page.enroll_clicks, 0);
        assert_eq!(ledger.entries().len(), 1);
        assert_eq!(ledger.entries()[0].outcome, AcquisitionOutcome::Owned);
    }

    #[test]
    fn test_paid_course_is_terminal() {
        let page = FakePage::with_signal(Some(PageSignal::Paid));
        let mut ledger = MemoryLedger::new();
        let mut enroller = Enroller::new(page, &mut ledger, fast_config());

        let summary = enroller.run(&[target("abc")]).unwrap();
        assert_eq!(summary.paid, 1);
        assert_eq!(enroller.page.enroll_clicks, 0);
    }

    #[test]
    fn test_one_step_enrollment_skips_confirmation() {
        let mut page = FakePage::with_signal(Some(PageSignal::Enrollable));
        page.one_step = true;
        let mut ledger = MemoryLedger::new();
        let mut enroller = Enroller::new(page, &mut ledger, fast_config());

        let summary = enroller.run(&[target("abc")]).unwrap();
        assert_eq!(summary.acquired, 1);
        assert_eq!(enroller.page.enroll_clicks, 1);
        assert_eq!(enroller.page.confirm_clicks, 0);
    }

    #[test]
    fn test_two_step_enrollment() {
        let page = FakePage::with_signal(Some(PageSignal::Enrollable));
        let mut ledger = MemoryLedger::new();
        let mut enroller = Enroller::new(page, &mut ledger, fast_config());

        let summary = enroller.run(&[target("abc")]).unwrap();
        assert_eq!(summary.acquired, 1);
        assert_eq!(enroller.page.enroll_clicks, 1);
        assert_eq!(enroller.page.confirm_clicks, 1);
    }

    #[test]
    fn test_no_signal_is_unavailable() {
        let page = FakePage::with_signal(None);
        let mut ledger = MemoryLedger::new();
        let config = fast_config();
        let retries = config.retries;
        let mut enroller = Enroller::new(page, &mut ledger, config);

        let summary = enroller.run(&[target("abc")]).unwrap();
        assert_eq!(summary.unavailable, 1);
        // Detection used the whole budget before giving up.
        assert_eq!(enroller.page.detects, retries);
        assert_eq!(ledger.entries()[0].outcome, AcquisitionOutcome::Unavailable);
    }

    #[test]
    fn test_detection_errors_exhaust_to_failed() {
        let mut page = FakePage::with_signal(None);
        page.signal_error = true;
        let mut ledger = MemoryLedger::new();
        let mut enroller = Enroller::new(page, &mut ledger, fast_config());

        let summary = enroller.run(&[target("abc")]).unwrap();
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_unclickable_confirm_fails_after_budget() {
        let mut page = FakePage::with_signal(Some(PageSignal::Enrollable));
        page.confirm_clickable = false;
        let mut ledger = MemoryLedger::new();
        let config = fast_config();
        let retries = config.retries;
        let mut enroller = Enroller::new(page, &mut ledger, config);

        let summary = enroller.run(&[target("abc")]).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(enroller.page.confirm_clicks, retries);
    }

    #[test]
    fn test_ledger_guard_skips_settled_slugs() {
        let mut ledger = MemoryLedger::new();
        ledger
            .append(&crate::ledger::entry_now("abc", AcquisitionOutcome::Acquired))
            .unwrap();

        let page = FakePage::with_signal(Some(PageSignal::Enrollable));
        let mut enroller = Enroller::new(page, &mut ledger, fast_config());
        let summary = enroller.run(&[target("abc")]).unwrap();

        // No navigation, no new ledger entry, prior outcome reused.
        assert_eq!(enroller.page.opens, 0);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.acquired, 1);
        assert_eq!(ledger.entries().len(), 1);
    }

    #[test]
    fn test_unsettled_prior_outcome_is_retried() {
        let mut ledger = MemoryLedger::new();
        ledger
            .append(&crate::ledger::entry_now("abc", AcquisitionOutcome::Failed))
            .unwrap();

        let mut page = FakePage::with_signal(Some(PageSignal::Enrollable));
        page.one_step = true;
        let mut enroller = Enroller::new(page, &mut ledger, fast_config());
        let summary = enroller.run(&[target("abc")]).unwrap();

        assert_eq!(enroller.page.opens, 1);
        assert_eq!(summary.acquired, 1);
        assert_eq!(ledger.entries().len(), 2);
    }

    #[test]
    fn test_cancelled_batch_skips_all_navigation() {
        let cancel = Arc::new(AtomicBool::new(true));
        let page = FakePage::with_signal(Some(PageSignal::Enrollable));
        let mut ledger = MemoryLedger::new();
        let mut enroller = Enroller::with_cancel(page, &mut ledger, fast_config(), cancel);

        let summary = enroller.run(&[target("a"), target("b")]).unwrap();
        assert_eq!(enroller.page.opens, 0);
        assert_eq!(summary.total(), 0);
        assert_eq!(ledger.entries().len(), 0);
    }

    #[test]
    fn test_cancel_mid_batch_returns_partial_counts() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut page = FakePage::with_signal(Some(PageSignal::Owned));
        // The interrupt lands while the first target's page is loading.
        page.cancel_on_open = Some(cancel.clone());
        let mut ledger = MemoryLedger::new();
        let mut enroller = Enroller::with_cancel(page, &mut ledger, fast_config(), cancel);

        let summary = enroller.run(&[target("a"), target("b"), target("c")]).unwrap();
        // The in-flight target finishes, the rest of the batch does not start.
        assert_eq!(enroller.page.opens, 1);
        assert_eq!(summary.owned, 1);
        assert_eq!(summary.total(), 1);
        assert_eq!(ledger.entries().len(), 1);
    }

    #[test]
    fn test_exactly_one_ledger_entry_per_target() {
        let page = FakePage::with_signal(Some(PageSignal::Owned));
        let mut ledger = MemoryLedger::new();
        let mut enroller = Enroller::new(page, &mut ledger, fast_config());

        let targets = [target("a"), target("b"), target("c")];
        let summary = enroller.run(&targets).unwrap();
        assert_eq!(summary.total(), 3);
        assert_eq!(ledger.entries().len(), 3);
    }
}
