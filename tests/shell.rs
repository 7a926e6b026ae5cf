mod common;

use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use bunkai::models::{BookMeta, Focus, Screen, ScrollChannel};
use bunkai::ui::shell::Shell;

use common::{Harness, book_bytes, harness};

fn shell(h: &Harness) -> Shell {
    Shell::new(h.session.clone(), Duration::from_millis(150))
}

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

#[tokio::test]
async fn test_restore_without_book_stays_on_landing() {
    let h = harness().await;
    let shell = shell(&h);

    assert_eq!(shell.restore().await.unwrap(), Screen::Landing);
    assert!(shell.router().has_handler());
    shell.navigate("c1").await.unwrap();
    assert!(h.engine.displays().is_empty());
}

#[tokio::test]
async fn test_contents_navigation_switches_to_reader() {
    let h = harness().await;
    let shell = shell(&h);
    shell.open_book("novel.epub", book_bytes()).await.unwrap();
    assert_eq!(shell.screen(), Screen::Contents);

    shell.view().open_drawer();
    shell.navigate("c2").await.unwrap();

    assert_eq!(shell.screen(), Screen::Reader);
    assert!(!shell.view().is_drawer_open());
    assert_eq!(h.session.current_location().as_deref(), Some("c2"));
}

#[tokio::test]
async fn test_restore_resumes_reading_screen() {
    let h = harness().await;
    let meta = BookMeta::from_file_name("a.epub", &book_bytes());
    h.gateway.store_book(&book_bytes(), &meta).await.unwrap();
    let shell = shell(&h);
    assert_eq!(shell.restore().await.unwrap(), Screen::Contents);

    h.gateway.save_location("c1").await.unwrap();
    assert_eq!(shell.restore().await.unwrap(), Screen::Reader);
    assert_eq!(h.session.current_location().as_deref(), Some("c1"));
}

#[tokio::test]
async fn test_arrow_keys_step_through_chapters() {
    let h = harness().await;
    let shell = shell(&h);
    shell.open_book("novel.epub", book_bytes()).await.unwrap();
    shell.navigate("c1").await.unwrap();

    assert!(shell.handle_key(key(KeyCode::Right), Focus::Document).await.unwrap());
    assert_eq!(h.session.current_location().as_deref(), Some("c2"));
    assert!(shell.handle_key(key(KeyCode::Right), Focus::Document).await.unwrap());
    assert_eq!(h.session.current_location().as_deref(), Some("c2a"));
    assert!(!shell.handle_key(key(KeyCode::Right), Focus::Document).await.unwrap());

    assert!(shell.handle_key(key(KeyCode::Left), Focus::Document).await.unwrap());
    assert_eq!(h.session.current_location().as_deref(), Some("c2"));
    assert_eq!(shell.contents().footer().as_deref(), Some("2 / 3"));
}

#[tokio::test]
async fn test_keys_ignored_in_text_input_and_on_release() {
    let h = harness().await;
    let shell = shell(&h);
    shell.open_book("novel.epub", book_bytes()).await.unwrap();
    shell.navigate("c1").await.unwrap();

    assert!(!shell.handle_key(key(KeyCode::Right), Focus::TextInput).await.unwrap());
    let mut release = key(KeyCode::Right);
    release.kind = KeyEventKind::Release;
    assert!(!shell.handle_key(release, Focus::Document).await.unwrap());
    assert!(!shell.handle_key(key(KeyCode::Char('x')), Focus::Document).await.unwrap());
    assert_eq!(h.session.current_location().as_deref(), Some("c1"));
}

#[tokio::test]
async fn test_keys_ignored_outside_reader() {
    let h = harness().await;
    let shell = shell(&h);
    shell.open_book("novel.epub", book_bytes()).await.unwrap();

    assert!(!shell.handle_key(key(KeyCode::Right), Focus::Document).await.unwrap());
    assert!(h.engine.displays().is_empty());
}

#[tokio::test]
async fn test_discard_returns_to_landing() {
    let h = harness().await;
    let shell = shell(&h);
    shell.open_book("novel.epub", book_bytes()).await.unwrap();

    shell.discard().await.unwrap();

    assert_eq!(shell.screen(), Screen::Landing);
    shell.navigate("c1").await.unwrap();
    assert!(h.engine.displays().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_scroll_offsets_settle_per_channel() {
    let h = harness().await;
    let shell = shell(&h);

    shell.record_scroll(ScrollChannel::Contents, 120.0);
    shell.record_scroll(ScrollChannel::Contents, 340.0);
    shell.record_scroll(ScrollChannel::Sidebar, 15.0);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(shell.restore_scroll(ScrollChannel::Contents).await, 340.0);
    assert_eq!(shell.restore_scroll(ScrollChannel::Sidebar).await, 15.0);
}

#[tokio::test]
async fn test_flush_writes_pending_offsets() {
    let h = harness().await;
    let shell = shell(&h);

    shell.record_scroll(ScrollChannel::Sidebar, 42.0);
    shell.flush().await;

    assert_eq!(shell.restore_scroll(ScrollChannel::Sidebar).await, 42.0);
}
