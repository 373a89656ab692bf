//! Page-by-page result listing.
//!
//! Rows are numbered from 1 on every page. Between pages the pager prints
//! `----more----` and waits for Enter, unless it runs in continuous mode.
//! Ctrl-C stops the current listing without ending the shell, whether it
//! arrives during a fetch or at a prompt.

use colored::Colorize;
use cqlscope_abstraction::CqlValue;
use cqlscope_core::schema::is_system_keyspace;
use cqlscope_core::{Page, QuerySession, SessionError};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tracing::debug;

use crate::colors::ShellColors;

pub const MORE_PROMPT: &str = "----more----";

/// Ctrl-C latch shared between the signal task and the pager.
#[derive(Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Interrupt {
    /// Latch fed by a background task listening for Ctrl-C.
    pub fn install() -> Self {
        let interrupt = Self::default();
        let latch = interrupt.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                latch.raise();
            }
        });
        interrupt
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Returns whether Ctrl-C was pressed since the last call, and resets.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::SeqCst)
    }

    /// Resolves once the latch is raised.
    pub async fn raised(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.raised.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// Lines of user input, read on a dedicated thread.
///
/// A blocking read never holds up the runtime, so a pending prompt can lose
/// the race against Ctrl-C. The thread reads at most one line ahead.
pub struct LineReader {
    lines: mpsc::Receiver<io::Result<String>>,
}

impl LineReader {
    pub fn spawn<R: BufRead + Send + 'static>(mut input: R) -> Self {
        let (tx, rx) = mpsc::channel(1);
        std::thread::spawn(move || {
            loop {
                let mut line = String::new();
                match input.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.blocking_send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
        });
        Self { lines: rx }
    }

    /// Next line, `None` once the input has ended.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.lines.recv().await.transpose()
    }
}

/// What a prompt got back.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    Line(String),
    /// End of input.
    Closed,
    /// Ctrl-C while waiting.
    Interrupted,
}

/// Outcome of one listing.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Listing {
    pub pages: usize,
    pub rows: usize,
    pub elapsed: Duration,
    pub interrupted: bool,
}

/// Prints query results page by page.
pub struct Pager<W> {
    input: LineReader,
    output: W,
    continuous: bool,
    interrupt: Interrupt,
    colors: ShellColors,
}

impl<W: Write> Pager<W> {
    pub fn new(input: LineReader, output: W, continuous: bool, interrupt: Interrupt) -> Self {
        Self { input, output, continuous, interrupt, colors: ShellColors::new() }
    }

    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Waits for one line of user input unless Ctrl-C arrives first.
    pub async fn read_line(&mut self) -> io::Result<Reply> {
        let line = tokio::select! {
            biased;
            () = self.interrupt.raised() => None,
            line = self.input.next_line() => Some(line),
        };
        match line {
            None => {
                self.interrupt.take();
                Ok(Reply::Interrupted)
            }
            Some(line) => Ok(line?.map_or(Reply::Closed, Reply::Line)),
        }
    }

    /// Runs `query` and lists every page.
    ///
    /// With `hide_system` rows whose `keyspace_name` is a system keyspace are
    /// skipped; numbering still counts them.
    pub async fn list(
        &mut self,
        session: &mut QuerySession,
        query: &str,
        page_size: usize,
        hide_system: bool,
    ) -> anyhow::Result<Listing> {
        let mut listing = Listing::default();
        self.interrupt.take();

        let Some(mut page) = self.fetch(session.query(query, page_size)).await? else {
            listing.interrupted = true;
            return Ok(listing);
        };

        loop {
            listing.pages += 1;
            listing.elapsed += page.elapsed;
            listing.rows += self.print_page(&page, hide_system)?;

            if !page.has_more() {
                break;
            }
            if self.interrupt.take() {
                listing.interrupted = true;
                break;
            }
            if !self.continuous && !self.wait_for_more().await? {
                listing.interrupted = true;
                break;
            }

            match self.fetch(session.query_next()).await? {
                Some(next) => page = next,
                None => {
                    listing.interrupted = true;
                    break;
                }
            }
        }

        // A Ctrl-C while the last page printed belongs to this listing.
        if self.interrupt.take() {
            listing.interrupted = true;
        }
        debug!(
            pages = listing.pages,
            rows = listing.rows,
            interrupted = listing.interrupted,
            "Listing finished"
        );
        Ok(listing)
    }

    /// Awaits a fetch unless Ctrl-C arrives first.
    async fn fetch(
        &self,
        fetch: impl std::future::Future<Output = Result<Page, SessionError>>,
    ) -> Result<Option<Page>, SessionError> {
        tokio::select! {
            biased;
            () = self.interrupt.raised() => {
                self.interrupt.take();
                Ok(None)
            }
            page = fetch => page.map(Some),
        }
    }

    fn print_page(&mut self, page: &Page, hide_system: bool) -> io::Result<usize> {
        let mut printed = 0;
        for (index, row) in page.rows.iter().enumerate() {
            if hide_system
                && row
                    .get("keyspace_name")
                    .and_then(CqlValue::as_text)
                    .is_some_and(is_system_keyspace)
            {
                continue;
            }
            writeln!(self.output, "{}", (index + 1).to_string().color(self.colors.primary()))?;
            writeln!(self.output, "{row}")?;
            printed += 1;
        }
        Ok(printed)
    }

    /// Prompts between pages. False when input ended or Ctrl-C was pressed.
    async fn wait_for_more(&mut self) -> io::Result<bool> {
        write!(self.output, "{}", MORE_PROMPT.color(self.colors.warning()))?;
        self.output.flush()?;
        let more = matches!(self.read_line().await?, Reply::Line(_));
        if !more {
            writeln!(self.output)?;
        }
        Ok(more)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlscope_abstraction::Endpoint;
    use cqlscope_core::schema::TABLES_QUERY;
    use cqlscope_drivers::{Fixture, FixtureConnector, FixtureTable};
    use std::io::{Cursor, Read};
    use std::sync::mpsc as std_mpsc;

    /// Input whose reads block until the sender is dropped.
    struct Stalled(std_mpsc::Receiver<()>);

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    fn stalled_pager() -> (Pager<Vec<u8>>, std_mpsc::Sender<()>) {
        let (tx, rx) = std_mpsc::channel();
        let input = LineReader::spawn(io::BufReader::new(Stalled(rx)));
        let mut pager = Pager::new(input, Vec::new(), false, Interrupt::default());
        pager.colors = ShellColors::with_support(crate::colors::ColorSupport::Basic);
        (pager, tx)
    }

    fn session(fixture: Fixture) -> QuerySession {
        QuerySession::new(
            Endpoint::new(vec!["127.0.0.1".to_string()], 9042),
            Arc::new(FixtureConnector::new(fixture)),
        )
    }

    fn numbers(count: i64) -> Fixture {
        let mut table = FixtureTable::new("app", "numbers", &["n"]);
        for n in 0..count {
            table = table.with_row(vec![CqlValue::Int(n)]);
        }
        Fixture::new().with_table(table)
    }

    fn pager(input: &str, continuous: bool) -> Pager<Vec<u8>> {
        let input = LineReader::spawn(Cursor::new(input.as_bytes().to_vec()));
        let mut pager = Pager::new(input, Vec::new(), continuous, Interrupt::default());
        pager.colors = ShellColors::with_support(crate::colors::ColorSupport::Basic);
        pager
    }

    fn text(pager: &Pager<Vec<u8>>) -> String {
        String::from_utf8_lossy(&pager.output).into_owned()
    }

    #[tokio::test]
    async fn test_continuous_lists_all_pages() {
        colored::control::set_override(false);
        let mut session = session(numbers(5));
        let mut pager = pager("", true);

        let listing =
            pager.list(&mut session, "SELECT * FROM app.numbers", 2, false).await.unwrap();
        assert_eq!(listing.pages, 3);
        assert_eq!(listing.rows, 5);
        assert!(!listing.interrupted);

        let out = text(&pager);
        assert!(!out.contains(MORE_PROMPT));
        assert!(out.contains("{'n': 4}"));
    }

    #[tokio::test]
    async fn test_prompt_between_pages() {
        colored::control::set_override(false);
        let mut session = session(numbers(5));
        let mut pager = pager("\n\n", false);

        let listing =
            pager.list(&mut session, "SELECT * FROM app.numbers", 2, false).await.unwrap();
        assert_eq!(listing.pages, 3);
        assert_eq!(text(&pager).matches(MORE_PROMPT).count(), 2);
    }

    #[tokio::test]
    async fn test_end_of_input_stops_listing() {
        colored::control::set_override(false);
        let mut session = session(numbers(5));
        let mut pager = pager("", false);

        let listing =
            pager.list(&mut session, "SELECT * FROM app.numbers", 2, false).await.unwrap();
        assert_eq!(listing.pages, 1);
        assert_eq!(listing.rows, 2);
        assert!(listing.interrupted);
        assert!(session.has_more());
    }

    #[tokio::test]
    async fn test_interrupt_at_prompt_stops_listing() {
        colored::control::set_override(false);
        let mut pager = pager("\n\n", false);
        assert!(pager.wait_for_more().await.unwrap());

        pager.interrupt().raise();
        assert!(!pager.wait_for_more().await.unwrap());
        assert!(!pager.interrupt().take());
    }

    #[tokio::test]
    async fn test_interrupt_while_prompt_waits_for_input() {
        let (mut pager, _keep_open) = stalled_pager();
        let interrupt = pager.interrupt().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            interrupt.raise();
        });

        let more = tokio::time::timeout(Duration::from_secs(5), pager.wait_for_more())
            .await
            .expect("prompt should stop on Ctrl-C")
            .unwrap();
        assert!(!more);
        assert!(!pager.interrupt().take());
    }

    #[tokio::test]
    async fn test_interrupt_stops_listing_at_pending_prompt() {
        colored::control::set_override(false);
        let mut session = session(numbers(5));
        let (mut pager, _keep_open) = stalled_pager();
        let interrupt = pager.interrupt().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            interrupt.raise();
        });

        let listing = tokio::time::timeout(
            Duration::from_secs(5),
            pager.list(&mut session, "SELECT * FROM app.numbers", 2, false),
        )
        .await
        .expect("listing should stop on Ctrl-C")
        .unwrap();
        assert_eq!(listing.pages, 1);
        assert!(listing.interrupted);
        assert!(session.has_more());
        assert_eq!(text(&pager).matches(MORE_PROMPT).count(), 1);
    }

    #[tokio::test]
    async fn test_read_line_replies() {
        let mut pager = pager("desc tables\n", false);
        assert_eq!(pager.read_line().await.unwrap(), Reply::Line("desc tables\n".to_string()));
        assert_eq!(pager.read_line().await.unwrap(), Reply::Closed);
        pager.interrupt().raise();
        assert_eq!(pager.read_line().await.unwrap(), Reply::Interrupted);
    }

    #[tokio::test]
    async fn test_interrupt_cancels_pending_fetch() {
        let mut session = session(numbers(5));
        let pager = pager("", true);
        pager.interrupt().raise();

        let fetched = pager.fetch(session.query("SELECT * FROM app.numbers", 2)).await.unwrap();
        assert!(fetched.is_none());
        assert!(!pager.interrupt().take());
        assert!(session.last_query().is_none());
    }

    #[tokio::test]
    async fn test_numbering_restarts_per_page() {
        colored::control::set_override(false);
        let mut session = session(numbers(3));
        let mut pager = pager("", true);
        pager.list(&mut session, "SELECT * FROM app.numbers", 2, false).await.unwrap();

        let lines: Vec<String> = text(&pager).lines().map(ToString::to_string).collect();
        assert_eq!(lines, vec!["1", "{'n': 0}", "2", "{'n': 1}", "1", "{'n': 2}"]);
    }

    #[tokio::test]
    async fn test_hide_system_keyspaces() {
        colored::control::set_override(false);
        let mut session = session(Fixture::system_schema());
        let mut pager = pager("", true);

        let listing = pager.list(&mut session, TABLES_QUERY, 50, true).await.unwrap();
        let out = text(&pager);
        assert!(listing.rows > 0);
        assert!(out.contains("obj_uuid_table"));
        assert!(!out.contains("'system_auth'"));
    }

    #[tokio::test]
    async fn test_rejected_query_is_an_error() {
        let mut session = session(numbers(1));
        let mut pager = pager("", true);
        let err = pager
            .list(&mut session, "SELEKT * FROM x", 2, false)
            .await
            .unwrap_err();
        let err = err.downcast::<SessionError>().unwrap();
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn test_raised_resolves_after_raise() {
        let interrupt = Interrupt::default();
        let waiter = interrupt.clone();
        let task = tokio::spawn(async move { waiter.raised().await });
        interrupt.raise();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert!(interrupt.take());
        assert!(!interrupt.take());
    }
}
