use crate::display::{DisplayServer, XDisplay, XWindow};
use crate::error::WmError;
use crate::window::{Client, Quad, WindowFlags, WindowKind};
use glam::{Mat3, Mat4, Vec4};
use libc::{c_char, c_int, c_uint, c_void};
use std::collections::HashMap;
use std::ffi::CString;
use std::path::Path;
use x11::{glx, xlib};

/// Compositing backend. The core walks the stack once per presented frame
/// and pushes each drawable window through here with its composed matrix;
/// everything GL stays behind this seam.
pub trait Renderer {
    fn begin_frame(&mut self);
    fn draw_window(&mut self, win: &mut Client, matrix: Mat4);
    /// Present. The final step of a frame; skipped entirely when no state
    /// changed.
    fn end_frame(&mut self);

    /// Decode an image file into a texture for background tiling.
    fn load_image(&mut self, path: &Path) -> Result<u32, WmError>;
    /// Build a reusable quad covering the given pixel rectangle.
    fn create_quad(&mut self, rect: Quad) -> (u32, u32);
    /// Release GPU state for a window about to leave the stack.
    fn forget_window(&mut self, win: &Client);
}

/// GL-over-GLX implementation drawing into the composite overlay. One shader
/// program; per-window quad buffers built lazily and rebuilt when geometry
/// changes; window textures uploaded from the server on damage.
pub struct GlRenderer {
    display: *mut xlib::Display,
    overlay: XWindow,
    width: i32,
    height: i32,
    context: glx::GLXContext,
    program: u32,
    u_mvp: i32,
    u_model: i32,
    u_normal: i32,
    u_color: i32,
    /// Geometry each window's quad was built for.
    quads: HashMap<XWindow, Quad>,
}

const VERTEX_SHADER: &str = r#"
#version 120
attribute vec2 position;
attribute vec2 texcoord;
uniform mat4 mvp;
uniform mat4 model;
varying vec2 v_uv;
void main() {
    gl_Position = mvp * model * vec4(position, 0.0, 1.0);
    v_uv = texcoord;
}
"#;

const FRAGMENT_SHADER: &str = r#"
#version 120
uniform sampler2D content;
uniform vec4 color;
varying vec2 v_uv;
void main() {
    gl_FragColor = texture2D(content, v_uv) * color;
}
"#;

impl GlRenderer {
    /// Creates a GL context bound to the overlay and compiles the one shader
    /// program the compositor uses.
    pub fn new(display: &XDisplay) -> Result<Self, WmError> {
        let raw = display.raw();
        let overlay = display.overlay();
        let (width, height) = display.screen_size();

        let context = unsafe {
            let screen = xlib::XDefaultScreen(raw);
            let mut attribs = [
                glx::GLX_RGBA,
                glx::GLX_DOUBLEBUFFER,
                glx::GLX_DEPTH_SIZE,
                24,
                0,
            ];
            let visual = glx::glXChooseVisual(raw, screen, attribs.as_mut_ptr());
            if visual.is_null() {
                return Err(WmError::GlContext);
            }
            let context = glx::glXCreateContext(raw, visual, std::ptr::null_mut(), xlib::True);
            if context.is_null() {
                return Err(WmError::GlContext);
            }
            if glx::glXMakeCurrent(raw, overlay, context) == 0 {
                return Err(WmError::GlContext);
            }
            context
        };

        load_gl()?;

        let program = unsafe {
            let vs = compile_shader(gl::VERTEX_SHADER, VERTEX_SHADER)?;
            let fs = compile_shader(gl::FRAGMENT_SHADER, FRAGMENT_SHADER)?;
            let program = gl::CreateProgram();
            gl::AttachShader(program, vs);
            gl::AttachShader(program, fs);
            gl::BindAttribLocation(program, 0, b"position\0".as_ptr() as *const c_char);
            gl::BindAttribLocation(program, 1, b"texcoord\0".as_ptr() as *const c_char);
            gl::LinkProgram(program);
            gl::DeleteShader(vs);
            gl::DeleteShader(fs);

            let mut ok = 0;
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut ok);
            if ok == 0 {
                return Err(WmError::Shader("program link failed".into()));
            }
            program
        };

        let uniform = |name: &[u8]| unsafe {
            gl::GetUniformLocation(program, name.as_ptr() as *const c_char)
        };

        info!("GL context on overlay {:#x} ready", overlay);

        Ok(GlRenderer {
            display: raw,
            overlay,
            width,
            height,
            context,
            program,
            u_mvp: uniform(b"mvp\0"),
            u_model: uniform(b"model\0"),
            u_normal: uniform(b"normal_matrix\0"),
            u_color: uniform(b"color\0"),
            quads: HashMap::new(),
        })
    }

    /// Quad vertices in normalized device coordinates: origin at screen
    /// center, y up, one screen spanning 2.0 units each way.
    fn build_quad(&self, rect: Quad) -> (u32, u32) {
        let w2 = self.width as f32 / 2.0;
        let h2 = self.height as f32 / 2.0;
        let x0 = rect.x as f32 / w2 - 1.0;
        let x1 = (rect.x + rect.w) as f32 / w2 - 1.0;
        let y0 = 1.0 - rect.y as f32 / h2;
        let y1 = 1.0 - (rect.y + rect.h) as f32 / h2;

        #[rustfmt::skip]
        let vertices: [f32; 16] = [
            x0, y0, 0.0, 0.0,
            x1, y0, 1.0, 0.0,
            x0, y1, 0.0, 1.0,
            x1, y1, 1.0, 1.0,
        ];

        unsafe {
            let (mut vao, mut vbo) = (0, 0);
            gl::GenVertexArrays(1, &mut vao);
            gl::GenBuffers(1, &mut vbo);
            gl::BindVertexArray(vao);
            gl::BindBuffer(gl::ARRAY_BUFFER, vbo);
            gl::BufferData(
                gl::ARRAY_BUFFER,
                std::mem::size_of_val(&vertices) as isize,
                vertices.as_ptr() as *const c_void,
                gl::STATIC_DRAW,
            );
            let stride = (4 * std::mem::size_of::<f32>()) as i32;
            gl::EnableVertexAttribArray(0);
            gl::VertexAttribPointer(0, 2, gl::FLOAT, gl::FALSE, stride, std::ptr::null());
            gl::EnableVertexAttribArray(1);
            gl::VertexAttribPointer(
                1,
                2,
                gl::FLOAT,
                gl::FALSE,
                stride,
                (2 * std::mem::size_of::<f32>()) as *const c_void,
            );
            gl::BindVertexArray(0);
            (vao, vbo)
        }
    }

    fn ensure_quad(&mut self, win: &mut Client) {
        let stale = self.quads.get(&win.id) != Some(&win.attrib);
        if win.vao != 0 && (!stale || win.flags.contains(WindowFlags::NO_VBO_CHANGE)) {
            return;
        }
        if win.vao != 0 {
            unsafe {
                gl::DeleteVertexArrays(1, &win.vao);
                gl::DeleteBuffers(1, &win.vbo);
            }
        }
        let (vao, vbo) = self.build_quad(win.attrib);
        win.vao = vao;
        win.vbo = vbo;
        self.quads.insert(win.id, win.attrib);
    }

    /// Snapshot the window's contents from the server and (re)upload them.
    fn upload_texture(&mut self, win: &mut Client) {
        unsafe {
            let image = xlib::XGetImage(
                self.display,
                win.id,
                0,
                0,
                win.attrib.w.max(1) as c_uint,
                win.attrib.h.max(1) as c_uint,
                !0,
                xlib::ZPixmap,
            );
            if image.is_null() {
                /* the error handler will have flagged the window */
                return;
            }

            if win.texture == 0 {
                gl::GenTextures(1, &mut win.texture);
            }
            gl::BindTexture(gl::TEXTURE_2D, win.texture);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as i32);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA as i32,
                (*image).width,
                (*image).height,
                0,
                gl::BGRA,
                gl::UNSIGNED_BYTE,
                (*image).data as *const c_void,
            );

            /* XDestroyImage is a macro; its stock destructor frees the pixel
             * buffer and then the struct */
            xlib::XFree((*image).data as *mut c_void);
            xlib::XFree(image as *mut c_void);
        }
    }
}

impl Renderer for GlRenderer {
    fn begin_frame(&mut self) {
        unsafe {
            glx::glXMakeCurrent(self.display, self.overlay, self.context);
            gl::Viewport(0, 0, self.width, self.height);
            gl::ClearColor(0.0, 0.0, 0.0, 1.0);
            gl::Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT);
            gl::Enable(gl::BLEND);
            gl::BlendFunc(gl::SRC_ALPHA, gl::ONE_MINUS_SRC_ALPHA);
        }
    }

    fn draw_window(&mut self, win: &mut Client, matrix: Mat4) {
        self.ensure_quad(win);
        if win.kind == WindowKind::Normal && (win.damaged() || win.texture == 0) {
            self.upload_texture(win);
        }
        if win.texture == 0 {
            return;
        }

        let normal = Mat3::from_mat4(matrix).inverse().transpose();
        unsafe {
            gl::UseProgram(self.program);
            gl::UniformMatrix4fv(
                self.u_mvp,
                1,
                gl::FALSE,
                Mat4::IDENTITY.to_cols_array().as_ptr(),
            );
            gl::UniformMatrix4fv(self.u_model, 1, gl::FALSE, matrix.to_cols_array().as_ptr());
            if self.u_normal >= 0 {
                gl::UniformMatrix3fv(self.u_normal, 1, gl::FALSE, normal.to_cols_array().as_ptr());
            }
            let color: Vec4 = win.transform.color;
            gl::Uniform4f(self.u_color, color.x, color.y, color.z, color.w);

            gl::ActiveTexture(gl::TEXTURE0);
            gl::BindTexture(gl::TEXTURE_2D, win.texture);
            gl::BindVertexArray(win.vao);
            gl::DrawArrays(gl::TRIANGLE_STRIP, 0, 4);
            gl::BindVertexArray(0);
        }
    }

    fn end_frame(&mut self) {
        unsafe {
            glx::glXSwapBuffers(self.display, self.overlay);
        }
    }

    fn load_image(&mut self, path: &Path) -> Result<u32, WmError> {
        let decoded = image::open(path).map_err(|err| WmError::BadImage {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        let rgba = decoded.to_rgba8();
        let (w, h) = rgba.dimensions();
        let pixels = rgba.into_raw();

        unsafe {
            let mut texture = 0;
            gl::GenTextures(1, &mut texture);
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as i32);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as i32);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                gl::RGBA as i32,
                w as i32,
                h as i32,
                0,
                gl::RGBA,
                gl::UNSIGNED_BYTE,
                pixels.as_ptr() as *const c_void,
            );
            Ok(texture)
        }
    }

    fn create_quad(&mut self, rect: Quad) -> (u32, u32) {
        self.build_quad(rect)
    }

    fn forget_window(&mut self, win: &Client) {
        self.quads.remove(&win.id);
        /* desktop tiles share their texture and buffers; only windows with
         * private GPU state give it back */
        if win.kind != WindowKind::Normal {
            return;
        }
        unsafe {
            if win.texture != 0 {
                gl::DeleteTextures(1, &win.texture);
            }
            if win.vao != 0 {
                gl::DeleteVertexArrays(1, &win.vao);
                gl::DeleteBuffers(1, &win.vbo);
            }
        }
    }
}

fn load_gl() -> Result<(), WmError> {
    /* GLX guarantees libGL is resident; resolve entry points out of it. */
    let lib = unsafe {
        libc::dlopen(
            b"libGL.so.1\0".as_ptr() as *const c_char,
            libc::RTLD_LAZY | libc::RTLD_GLOBAL,
        )
    };
    if lib.is_null() {
        return Err(WmError::GlContext);
    }
    gl::load_with(|symbol| {
        let name = CString::new(symbol).unwrap();
        unsafe { libc::dlsym(lib, name.as_ptr()) as *const c_void }
    });
    Ok(())
}

fn compile_shader(kind: u32, source: &str) -> Result<u32, WmError> {
    unsafe {
        let shader = gl::CreateShader(kind);
        let src = CString::new(source).unwrap();
        gl::ShaderSource(shader, 1, &src.as_ptr(), std::ptr::null());
        gl::CompileShader(shader);

        let mut ok = 0;
        gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut ok);
        if ok == 0 {
            let mut len: c_int = 0;
            gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
            let mut buf = vec![0u8; len.max(1) as usize];
            gl::GetShaderInfoLog(shader, len, std::ptr::null_mut(), buf.as_mut_ptr() as *mut c_char);
            let log = String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string();
            return Err(WmError::Shader(log));
        }
        Ok(shader)
    }
}
