//! pvr-direct: immediate-mode polygon submission demos
//!
//! Cubes, sprites and a zooming background pushed through a direct-render
//! command pipeline and drawn by a software tile renderer:
//! - Perspective and screen-space model transforms
//! - Header + strip faces and two-burst sprite quads
//! - Double-buffered scenes rendered on a worker thread

/// Version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod pvr;
mod config;
mod input;
mod noise;
mod demo;
mod app;

use macroquad::prelude::*;
use app::AppState;
use config::{load_or_default, DEFAULT_CONFIG_PATH};
use demo::{DemoKind, DemoTextures};
use pvr::{Device, SCREEN_HEIGHT, SCREEN_WIDTH};

fn window_conf() -> Conf {
    Conf {
        window_title: format!("pvr-direct v{}", VERSION),
        window_width: SCREEN_WIDTH as i32 * 2,
        window_height: SCREEN_HEIGHT as i32 * 2,
        window_resizable: true,
        high_dpi: true,
        ..Default::default()
    }
}

/// Scale the front buffer into the window, keeping its aspect
fn present(dev: &Device) {
    let texture = {
        let fb = dev.front_buffer().lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Texture2D::from_rgba8(fb.width as u16, fb.height as u16, &fb.pixels)
    };
    texture.set_filter(FilterMode::Nearest);

    let (w, h) = (texture.width(), texture.height());
    let scale = (screen_width() / w).min(screen_height() / h);
    let (draw_w, draw_h) = (w * scale, h * scale);
    draw_texture_ex(
        &texture,
        (screen_width() - draw_w) / 2.0,
        (screen_height() - draw_h) / 2.0,
        WHITE,
        DrawTextureParams {
            dest_size: Some(Vec2::new(draw_w, draw_h)),
            ..Default::default()
        },
    );
}

fn draw_hud(app: &AppState, dev: &Device) {
    let stats = dev.stats();
    draw_text(
        &format!(
            "{} | frame {} | {} bytes | {:.2} ms",
            app.active.label(),
            stats.frame_count,
            stats.vertex_bytes_used,
            stats.last_render_time.as_secs_f64() * 1000.0,
        ),
        8.0,
        20.0,
        18.0,
        Color::from_rgba(200, 200, 200, 255),
    );
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("=== pvr-direct v{} ===", VERSION);

    let config = load_or_default(DEFAULT_CONFIG_PATH);

    let mut dev = match Device::init(config.device.clone()) {
        Ok(dev) => dev,
        Err(e) => {
            log::error!("failed to start the render worker: {}", e);
            return;
        }
    };

    let textures = match DemoTextures::upload(dev.vram(), &config.textures, &config.noise) {
        Ok(textures) => textures,
        Err(e) => {
            log::error!("failed to load textures: {}", e);
            dev.shutdown();
            return;
        }
    };

    let mut app = AppState::new(&config, textures);
    log::info!("demo: {} (Tab or 1-5 switch, Escape exits)", app.active.label());

    loop {
        if is_key_pressed(KeyCode::Tab) {
            app.next_demo();
        }
        let number_keys = [KeyCode::Key1, KeyCode::Key2, KeyCode::Key3, KeyCode::Key4, KeyCode::Key5];
        for (i, key) in number_keys.into_iter().enumerate() {
            if is_key_pressed(key) {
                if let Some(kind) = DemoKind::from_index(i) {
                    app.set_active(kind);
                }
            }
        }

        let pad = input::poll_devices();
        if !app.update(&pad) {
            break;
        }

        // Errors are logged and the scene aborted; the next frame retries
        let _ = app.render_frame(&mut dev);

        clear_background(BLACK);
        present(&dev);
        draw_hud(&app, &dev);

        next_frame().await;
    }

    app.release(dev.vram());
    dev.shutdown();
}
