use crate::controller::DeviceState;
use crate::presets::PRESETS;

const CONTROL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>WS2812B LED Control</title>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
        body { font-family: sans-serif; padding: 20px; max-width: 600px; margin: 0 auto; }
        label { display: block; margin-top: 10px; }
        .slider { width: 100%; }
        .header { display: flex; justify-content: space-between; align-items: center; }
        .links a { margin-left: 10px; color: #0066cc; text-decoration: none; }
        .status { background: #f0f0f0; padding: 10px; margin: 15px 0; border-radius: 5px; font-size: 0.9em; }
        .buttons button { margin: 4px 4px 0 0; }
    </style>
</head>
<body>
    <div class="header">
        <h1>LED Controller</h1>
        <div class="links">
            <a href="/health" target="_blank">Health</a>
            <a href="/api/docs" target="_blank">API Docs</a>
        </div>
    </div>
    <div class="status">
        <strong>LEDs:</strong> {{LEDS}} |
        <strong>Current:</strong> R={{R}} G={{G}} B={{B}} |
        <strong>Brightness:</strong> {{BRIGHTNESS}}
    </div>
    <label>White:
        <input type="range" min="0" max="255" value="{{R}}" id="w" class="slider">
        <output id="w_val">{{R}}</output>
    </label>
    <label>Red:
        <input type="range" min="0" max="255" value="{{R}}" id="r" class="slider">
        <output id="r_val">{{R}}</output>
    </label>
    <label>Green:
        <input type="range" min="0" max="255" value="{{G}}" id="g" class="slider">
        <output id="g_val">{{G}}</output>
    </label>
    <label>Blue:
        <input type="range" min="0" max="255" value="{{B}}" id="b" class="slider">
        <output id="b_val">{{B}}</output>
    </label>
    <label>Brightness:
        <input type="range" min="0" max="255" value="{{BRIGHTNESS}}" id="brightness" class="slider">
    </label>
    <div class="buttons">{{PRESETS}}</div>
    <div class="buttons">
        <button onclick="fetch('/animation/rainbow')">Rainbow</button>
        <button onclick="breathe()">Breathe</button>
        <button onclick="fetch('/animation/stop')">Stop</button>
        <button onclick="fetch('/clear')">Off</button>
    </div>
    <script>
        function value(id) { return parseInt(document.getElementById(id).value); }

        function sendUpdate(r, g, b) {
            fetch(`/update?r=${r}&g=${g}&b=${b}`);
        }

        function updateFromRGB() {
            ['r', 'g', 'b'].forEach(id => document.getElementById(id + "_val").textContent = value(id));
            sendUpdate(value('r'), value('g'), value('b'));
        }

        function updateFromWhite() {
            let w = value('w');
            document.getElementById("w_val").textContent = w;
            ['r', 'g', 'b'].forEach(id => {
                document.getElementById(id).value = w;
                document.getElementById(id + "_val").textContent = w;
            });
            sendUpdate(w, w, w);
        }

        function breathe() {
            fetch(`/animation/breathing?r=${value('r')}&g=${value('g')}&b=${value('b')}`);
        }

        document.getElementById("w").addEventListener("input", updateFromWhite);
        ['r', 'g', 'b'].forEach(id => document.getElementById(id).addEventListener("input", updateFromRGB));
        document.getElementById("brightness").addEventListener("change",
            () => fetch(`/brightness?value=${value('brightness')}`));
    </script>
</body>
</html>
"#;

pub const API_DOCS: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>API Documentation - WS2812B LED Controller</title>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
        body { font-family: monospace; padding: 20px; max-width: 800px; margin: 0 auto; }
        .endpoint { background: #f4f4f4; padding: 15px; margin: 10px 0; border-radius: 5px; }
        .method { color: #0066cc; font-weight: bold; }
        code { background: #e8e8e8; padding: 2px 5px; border-radius: 3px; }
    </style>
</head>
<body>
    <h1>WS2812B LED Controller API</h1>

    <div class="endpoint">
        <h2><span class="method">GET</span> /update</h2>
        <p>Set every LED to one color. <code>r</code>, <code>g</code>, <code>b</code> (0-255, missing
        channels keep their current value) or <code>color</code> (a name from <a href="/presets">/presets</a>).
        Stops any running animation. Responds <code>OK</code>.</p>
        <p><a href="/update?r=255&g=0&b=0">/update?r=255&amp;g=0&amp;b=0</a> |
           <a href="/update?color=blue">/update?color=blue</a></p>
    </div>

    <div class="endpoint">
        <h2><span class="method">GET</span> /clear</h2>
        <p>Turn every LED off.</p>
    </div>

    <div class="endpoint">
        <h2><span class="method">GET</span> /brightness</h2>
        <p>Strip brightness, <code>value</code> 0-255. Applied on top of the color.</p>
    </div>

    <div class="endpoint">
        <h2><span class="method">POST</span> /pixels</h2>
        <p>Set each LED individually. Body: <code>{"pixels": [[r, g, b], ...]}</code> with exactly one
        entry per LED. Responds 400 if the length or any channel is out of range.</p>
    </div>

    <div class="endpoint">
        <h2><span class="method">GET</span> /animation/rainbow | /animation/breathing | /animation/stop</h2>
        <p>Start the rainbow cycle, start breathing (<code>r</code>/<code>g</code>/<code>b</code> or
        <code>color</code>), or stop the running animation.</p>
    </div>

    <div class="endpoint">
        <h2><span class="method">GET</span> /health</h2>
        <p>JSON status: uptime, <code>updates_processed</code>, <code>num_leds</code>,
        <code>current_color</code>, <code>brightness</code>, <code>animation</code>,
        <code>last_error</code> and host statistics.</p>
    </div>

    <div class="endpoint">
        <h2><span class="method">GET</span> /presets</h2>
        <p>JSON map of color names to <code>[r, g, b]</code>.</p>
    </div>

    <p><a href="/">Back to Control Panel</a></p>
</body>
</html>
"#;

pub fn control_page(state: &DeviceState) -> String {
    let color = state.current_color();
    let presets: String = PRESETS
        .iter()
        .map(|(name, _)| {
            format!(
                "<button onclick=\"fetch('/update?color={0}')\">{0}</button>",
                name
            )
        })
        .collect();

    CONTROL_PAGE
        .replace("{{LEDS}}", &state.led_count.to_string())
        .replace("{{R}}", &color.r.to_string())
        .replace("{{G}}", &color.g.to_string())
        .replace("{{B}}", &color.b.to_string())
        .replace("{{BRIGHTNESS}}", &state.brightness.to_string())
        .replace("{{PRESETS}}", &presets)
}
