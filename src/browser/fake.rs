//! Scripted in-memory browser for driving the session, scroll loader and
//! orchestrator without Chrome.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use super::{Browser, BrowserError, CatalogEntry, Condition};

#[derive(Debug, Clone)]
pub struct FakeEntry {
    /// `None` simulates a node detached after enumeration.
    pub text: Option<String>,
    pub link: Option<String>,
}

impl FakeEntry {
    pub fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            link: None,
        }
    }

    pub fn with_link(mut self, link: &str) -> Self {
        self.link = Some(link.to_string());
        self
    }

    pub fn stale() -> Self {
        Self {
            text: None,
            link: None,
        }
    }
}

impl CatalogEntry for FakeEntry {
    fn text(&self) -> Result<String, BrowserError> {
        self.text
            .clone()
            .ok_or_else(|| BrowserError::StaleElement("detached".into()))
    }

    fn link(&self) -> Result<Option<String>, BrowserError> {
        Ok(self.link.clone())
    }
}

fn default_entry(i: usize) -> FakeEntry {
    FakeEntry::new(&format!(
        "Product {i}\nBrand {}\nHybrid\nTHC: {}.5%\n${}.00\n3.5g",
        i % 5,
        18 + i % 10,
        20 + i % 30
    ))
    .with_link(&format!("https://example.com/product/{i}"))
}

/// Behaviour of one URL.
#[derive(Clone)]
pub struct FakePage {
    pub initial: usize,
    pub per_scroll: usize,
    /// `None` means the feed never stops growing.
    pub total: Option<usize>,
    pub age_gate: bool,
    /// Gate is reported by `wait_for` but gone by the time it is clicked.
    pub gate_vanishes: bool,
    pub nav_failures: u32,
    pub entry: fn(usize) -> FakeEntry,
}

impl FakePage {
    /// All entries rendered on load.
    pub fn fixed(n: usize) -> Self {
        Self::growing(n, 0, n)
    }

    pub fn growing(initial: usize, per_scroll: usize, total: usize) -> Self {
        Self {
            initial,
            per_scroll,
            total: Some(total),
            age_gate: false,
            gate_vanishes: false,
            nav_failures: 0,
            entry: default_entry,
        }
    }

    pub fn unbounded(initial: usize, per_scroll: usize) -> Self {
        Self {
            total: None,
            ..Self::growing(initial, per_scroll, 0)
        }
    }

    pub fn with_entry(mut self, entry: fn(usize) -> FakeEntry) -> Self {
        self.entry = entry;
        self
    }

    pub fn with_age_gate(mut self) -> Self {
        self.age_gate = true;
        self
    }

    pub fn with_vanishing_age_gate(mut self) -> Self {
        self.age_gate = true;
        self.gate_vanishes = true;
        self
    }

    pub fn failing_navigation(mut self, times: u32) -> Self {
        self.nav_failures = times;
        self
    }

    fn cap(&self, n: usize) -> usize {
        match self.total {
            Some(total) => n.min(total),
            None => n,
        }
    }
}

/// Observations shared with the test after the browser is moved or dropped.
#[derive(Default)]
pub struct TrackerState {
    pub opens: RefCell<Vec<String>>,
    pub scrolls: Cell<usize>,
    pub gate_clicks: Cell<usize>,
    pub closed: Cell<bool>,
}

pub type Tracker = Rc<TrackerState>;

pub struct FakeBrowser {
    pages: HashMap<String, FakePage>,
    nav_failures: HashMap<String, u32>,
    current: Option<FakePage>,
    visible: Cell<usize>,
    gate_open: Cell<bool>,
    tracker: Tracker,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            nav_failures: HashMap::new(),
            current: None,
            visible: Cell::new(0),
            gate_open: Cell::new(false),
            tracker: Tracker::default(),
        }
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.nav_failures.insert(url.to_string(), page.nav_failures);
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn tracker(&self) -> Tracker {
        Rc::clone(&self.tracker)
    }

    fn current(&self) -> Result<&FakePage, BrowserError> {
        if self.tracker.closed.get() {
            return Err(BrowserError::Closed);
        }
        self.current
            .as_ref()
            .ok_or_else(|| BrowserError::Navigation("no page loaded".into()))
    }
}

impl Browser for FakeBrowser {
    fn open(&mut self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        if self.tracker.closed.get() {
            return Err(BrowserError::Closed);
        }
        self.tracker.opens.borrow_mut().push(url.to_string());
        if let Some(remaining) = self.nav_failures.get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BrowserError::Navigation(format!("timeout loading {}", url)));
            }
        }
        // unknown URLs load as an empty menu
        let page = self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| FakePage::fixed(0));
        self.visible.set(page.cap(page.initial));
        self.gate_open.set(page.age_gate);
        self.current = Some(page);
        Ok(())
    }

    fn find_all(&self, _selector: &str) -> Result<Vec<Box<dyn CatalogEntry + '_>>, BrowserError> {
        let page = self.current()?;
        Ok((0..self.visible.get())
            .map(|i| Box::new((page.entry)(i)) as Box<dyn CatalogEntry + '_>)
            .collect())
    }

    fn count(&self, _selector: &str) -> Result<usize, BrowserError> {
        self.current()?;
        Ok(self.visible.get())
    }

    fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        let page = self.current()?;
        self.tracker.scrolls.set(self.tracker.scrolls.get() + 1);
        self.visible
            .set(page.cap(self.visible.get() + page.per_scroll));
        Ok(())
    }

    fn wait_for(&self, condition: &Condition<'_>, _timeout: Duration) -> Result<bool, BrowserError> {
        self.current()?;
        Ok(match condition {
            Condition::Present(_) => self.visible.get() > 0,
            Condition::ButtonText(_) => self.gate_open.get(),
        })
    }

    fn click(&self, condition: &Condition<'_>) -> Result<(), BrowserError> {
        let page = self.current()?;
        match condition {
            Condition::ButtonText(_) if self.gate_open.get() && !page.gate_vanishes => {
                self.gate_open.set(false);
                self.tracker.gate_clicks.set(self.tracker.gate_clicks.get() + 1);
                Ok(())
            }
            _ => Err(BrowserError::ElementNotFound(format!("{:?}", condition))),
        }
    }

    fn close(&mut self) {
        self.tracker.closed.set(true);
    }
}
