use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};
use kestrel_browser::Driver;

/// Passes over the page before a persistent obstacle is declared
/// unrecoverable
const MAX_PASSES: usize = 5;

/// Login credentials supplied by the session configuration
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Single JS probe reporting the highest-priority obstacle on the page.
///
/// Priority is fixed: a CAPTCHA wins over a cookie banner, which wins
/// over a login wall, which wins over newsletter prompts and generic
/// modals. The probe also locates the affordance used to resolve what it
/// found.
const DETECT_JS: &str = r#"(() => {
    const vis = el => {
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0 && getComputedStyle(el).visibility !== 'hidden';
    };
    const sel = el => {
        if (el.id) return '#' + CSS.escape(el.id);
        if (el.name) return `${el.tagName.toLowerCase()}[name="${el.name}"]`;
        const cls = (el.className || '').toString().trim().split(/\s+/)[0];
        return el.tagName.toLowerCase() + (cls ? '.' + CSS.escape(cls) : '');
    };
    const firstVisible = q => Array.from(document.querySelectorAll(q)).find(vis) || null;

    if (firstVisible('iframe[src*="recaptcha"], iframe[src*="hcaptcha"], ' +
                     'iframe[src*="turnstile"], .g-recaptcha, .h-captcha, #cf-challenge')) {
        return { kind: 'captcha' };
    }

    const banner = firstVisible('[class*="cookie"], [id*="cookie"], [class*="consent"], ' +
                                '[id*="consent"], [aria-label*="cookie" i]');
    if (banner) {
        const accept = Array.from(banner.querySelectorAll('button, a'))
            .filter(vis)
            .find(b => /accept|agree|allow|got it|ok\b/i.test(b.innerText));
        return { kind: 'cookie_consent', target: accept ? sel(accept) : null };
    }

    const password = firstVisible('input[type="password"]');
    if (password) {
        const form = password.closest('form') || document;
        const username = Array.from(form.querySelectorAll(
            'input[type="email"], input[type="text"], input[autocomplete="username"]'))
            .find(vis) || null;
        const submit = Array.from(form.querySelectorAll(
            'button[type="submit"], input[type="submit"], button'))
            .find(vis) || null;
        const skip = Array.from(document.querySelectorAll('button, a'))
            .filter(vis)
            .find(b => /skip|continue as guest|browse as guest|not now|maybe later/i
                .test(b.innerText)) || null;
        return {
            kind: 'login_wall',
            username: username ? sel(username) : null,
            password: sel(password),
            submit: submit ? sel(submit) : null,
            skip: skip ? sel(skip) : null,
        };
    }

    const dialog = firstVisible('[role="dialog"], [aria-modal="true"], .modal');
    if (dialog) {
        const close = Array.from(dialog.querySelectorAll(
            'button, a, [aria-label*="close" i], [class*="close"]'))
            .filter(vis)
            .find(b => /close|dismiss|no thanks|not now|×|✕/i.test(
                b.innerText + (b.getAttribute('aria-label') || '')));
        const newsletter = /newsletter|subscribe|sign up for/i.test(dialog.innerText);
        return {
            kind: newsletter ? 'newsletter' : 'modal',
            target: close ? sel(close) : null,
        };
    }

    return null;
})()"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Obstacle {
    Captcha,
    CookieConsent {
        #[serde(default)]
        target: Option<String>,
    },
    LoginWall {
        #[serde(default)]
        username: Option<String>,
        password: String,
        #[serde(default)]
        submit: Option<String>,
        /// Affordance to proceed without logging in, when the page
        /// offers one
        #[serde(default)]
        skip: Option<String>,
    },
    Newsletter {
        #[serde(default)]
        target: Option<String>,
    },
    Modal {
        #[serde(default)]
        target: Option<String>,
    },
}

impl Obstacle {
    fn label(&self) -> &'static str {
        match self {
            Obstacle::Captcha => "captcha",
            Obstacle::CookieConsent { .. } => "cookie_consent",
            Obstacle::LoginWall { .. } => "login_wall",
            Obstacle::Newsletter { .. } => "newsletter",
            Obstacle::Modal { .. } => "modal",
        }
    }
}

/// Rule-based clearing of page furniture standing between the session and
/// its goal.
///
/// Resolution is best-effort: anything the rules cannot clear is declared
/// a blocker rather than guessed at, and the stored reason flows into the
/// session's failure report.
pub struct ObstacleResolver {
    driver: Arc<dyn Driver>,
    credentials: Option<Credentials>,
    pause: Duration,
    cleared: u32,
    blocker: Option<String>,
}

impl ObstacleResolver {
    pub fn new(driver: Arc<dyn Driver>, credentials: Option<Credentials>) -> Self {
        Self {
            driver,
            credentials,
            pause: Duration::from_millis(250),
            cleared: 0,
            blocker: None,
        }
    }

    #[cfg(test)]
    fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Obstacles cleared over the life of this resolver
    pub fn cleared(&self) -> u32 {
        self.cleared
    }

    /// Why the page is blocked, when `clear_obstacles` returned false
    pub fn blocker_reason(&self) -> Option<&str> {
        self.blocker.as_deref()
    }

    /// Detect and clear obstacles until the page is clean.
    ///
    /// `Ok(true)` means the way is clear; `Ok(false)` means an
    /// unrecoverable blocker remains and [`blocker_reason`](Self::blocker_reason)
    /// says why. Driver failures propagate as errors.
    pub async fn clear_obstacles(&mut self) -> Result<bool> {
        for _ in 0..MAX_PASSES {
            let Some(obstacle) = self.detect().await? else {
                return Ok(true);
            };

            match self.resolve(&obstacle).await {
                Ok(()) => {
                    tracing::info!("Cleared obstacle: {}", obstacle.label());
                    self.cleared += 1;
                    tokio::time::sleep(self.pause).await;
                }
                Err(e @ (Error::CaptchaBlocker | Error::ObstacleUnresolved(_))) => {
                    self.blocker = Some(e.to_string());
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }

        let reason = Error::ObstacleUnresolved(format!(
            "an obstacle persisted through {} resolution passes",
            MAX_PASSES
        ));
        self.blocker = Some(reason.to_string());
        Ok(false)
    }

    async fn detect(&self) -> Result<Option<Obstacle>> {
        let value = self.driver.evaluate(DETECT_JS).await?;
        if value.is_null() {
            return Ok(None);
        }
        let obstacle = serde_json::from_value(value)?;
        Ok(Some(obstacle))
    }

    async fn resolve(&self, obstacle: &Obstacle) -> Result<()> {
        match obstacle {
            Obstacle::Captcha => Err(Error::CaptchaBlocker),
            Obstacle::CookieConsent { target } => self.dismiss(target.as_deref()).await,
            Obstacle::Newsletter { target } | Obstacle::Modal { target } => {
                self.dismiss(target.as_deref()).await
            }
            Obstacle::LoginWall {
                username,
                password,
                submit,
                skip,
            } => {
                let Some(creds) = &self.credentials else {
                    // No credentials: a skip/guest affordance is the only
                    // way past
                    if let Some(skip_sel) = skip {
                        return Ok(self.driver.click(skip_sel).await?);
                    }
                    return Err(Error::ObstacleUnresolved(
                        "a login wall blocks the page and no credentials were provided"
                            .to_string(),
                    ));
                };
                if let Some(username_sel) = username {
                    self.driver.fill(username_sel, &creds.username).await?;
                }
                self.driver.fill(password, &creds.password).await?;
                match submit {
                    Some(submit_sel) => self.driver.click(submit_sel).await?,
                    None => self.driver.press_key(password, "Enter").await?,
                }
                Ok(())
            }
        }
    }

    /// Click the located affordance, or fall back to Escape
    async fn dismiss(&self, target: Option<&str>) -> Result<()> {
        match target {
            Some(selector) => Ok(self.driver.click(selector).await?),
            None => Ok(self.driver.press_key("body", "Escape").await?),
        }
    }
}
