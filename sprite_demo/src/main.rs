//! Sprite demo application
//!
//! Opens a window, loads one texture, and draws it every frame: a tiled row
//! of the whole image, a cropped corner, and one spinning copy in the middle.
//! Escape closes the window.

use glfw::{Action, Key};
use sprite_engine::foundation::logging;
use sprite_engine::prelude::*;
use std::time::Instant;
use thiserror::Error;

const DEMO_TEXTURE: &str = "resources/demo_sprite.png";

#[derive(Error, Debug)]
enum DemoError {
    #[error("window: {0}")]
    Window(#[from] WindowError),

    #[error("renderer: {0}")]
    Renderer(#[from] VulkanError),
}

fn run() -> Result<(), DemoError> {
    let window_config = WindowConfig {
        title: "Womp Womp".to_string(),
        width: 1200,
        height: 1000,
    };
    let mut window = Window::from_config(&window_config)?;

    let config = RendererConfig::new("Sprite Demo")
        .with_shaders(ShaderConfig::with_path_resolution("sprite.vert.spv", "sprite.frag.spv"));
    let mut renderer = SpriteBatchRenderer::new(&mut window, &config)?;

    let texture = renderer.create_texture(DEMO_TEXTURE)?;
    let (tex_width, tex_height) = renderer.texture_size(texture).unwrap_or((64, 64));
    log::info!("Demo texture is {}x{}", tex_width, tex_height);

    let start = Instant::now();
    let mut frames: u64 = 0;

    while !window.should_close() {
        window.poll_events();
        for (key, action) in window.take_key_events() {
            if key == Key::Escape && action == Action::Press {
                window.set_should_close(true);
            }
        }

        let elapsed = start.elapsed().as_secs_f32();
        let extent = renderer.extent();
        let (screen_w, screen_h) = (extent.width as f32, extent.height as f32);

        for i in 0..6 {
            let x = 20.0 + i as f32 * 110.0;
            let tint = Color::rgba(1.0, 1.0 - i as f32 * 0.15, 1.0, 1.0);
            renderer.draw_texture_at(texture, Vec2::new(x, 20.0), Vec2::new(100.0, 100.0), tint);
        }

        let corner = Rect::new(0.0, 0.0, tex_width as f32 / 2.0, tex_height as f32 / 2.0);
        renderer.draw_texture_unrotated(texture, corner, Rect::new(20.0, 140.0, 200.0, 200.0), Color::WHITE);

        let size = 256.0;
        let center = Rect::new((screen_w - size) / 2.0, (screen_h - size) / 2.0, size, size);
        renderer.draw_texture(texture, Rect::ZERO, center, elapsed, Color::WHITE);

        renderer.render(&mut window)?;
        frames += 1;
    }

    renderer.wait_idle()?;
    log::info!(
        "Rendered {} frames in {:.1}s",
        frames,
        start.elapsed().as_secs_f32()
    );
    Ok(())
}

fn main() {
    logging::init_with_level(log::LevelFilter::Info);

    if let Err(e) = run() {
        log::error!("Sprite demo failed: {}", e);
        std::process::exit(1);
    }
}
