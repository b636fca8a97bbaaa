/// Fragment program shown when no shader file is given.
pub const DEFAULT_FRAGMENT: &str = "precision mediump float;

uniform vec2 u_resolution;
uniform float u_time;
uniform sampler2D u_texture;
uniform vec2 u_mouse;

void main() {
    vec2 uv = gl_FragCoord.xy / u_resolution;

    // Sample texture
    vec4 texColor = texture2D(u_texture, uv);

    // Add some animation
    float wave = sin(uv.x * 10.0 + u_time) * 0.5 + 0.5;

    // Mix texture with effect
    vec3 color = texColor.rgb * wave;

    gl_FragColor = vec4(color, 1.0);
}
";
