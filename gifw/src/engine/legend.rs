use log::warn;

use crate::engine::Session;
use crate::layer::{Layer, LegendOptions};
use crate::map::GroupType;

/// Legend image request of a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendUrl {
    /// Layer id.
    pub layer_id: String,
    /// Layer name shown above the image.
    pub layer_name: String,
    /// GetLegendGraphic url.
    pub url: String,
    /// Auth headers to send with the request.
    pub headers: Vec<(String, String)>,
}

/// Legends of the drawn overlays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegendUrls {
    /// Layers with a legend image.
    pub legends: Vec<LegendUrl>,
    /// Names of drawn layers without a legend.
    pub non_legendable: Vec<String>,
}

/// Legend requests of every visible overlay drawn at the current zoom.
pub(crate) fn legend_urls(session: &Session, options: &LegendOptions) -> LegendUrls {
    let map = session.map();
    let zoom = map.view().zoom();

    let mut layers: Vec<&Layer> = [GroupType::Overlay, GroupType::UserNative]
        .into_iter()
        .filter_map(|group_type| map.group(group_type))
        .flat_map(|group| group.visible_layers())
        .filter(|layer| layer.is_in_zoom_range(zoom))
        .collect();
    layers.sort_by(|a, b| b.z_index().cmp(&a.z_index()));
    layers.reverse();

    let mut result = LegendUrls::default();
    for layer in layers {
        let url = match layer.source().wms().filter(|s| s.is_legend_capable()) {
            Some(source) => source.legend_url(options, session.proxy_url()),
            None => {
                result.non_legendable.push(layer.name().to_string());
                continue;
            }
        };

        match url {
            Ok(url) => result.legends.push(LegendUrl {
                layer_id: layer.id().to_string(),
                layer_name: layer.name().to_string(),
                headers: session.auth().headers_for(&url),
                url,
            }),
            Err(err) => {
                warn!("Cannot build the legend url of layer {}: {err}", layer.id());
                result.non_legendable.push(layer.name().to_string());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{FeatureStore, LayerSource, WmsSource};
    use crate::view::MapView;

    fn wms(id: &str, z_index: i32) -> Layer {
        Layer::new(
            id,
            id.to_uppercase(),
            LayerSource::Wms(
                WmsSource::new("https://maps.example.com/wms", id).with_param("styles", "bold"),
            ),
        )
        .with_z_index(z_index)
    }

    #[test]
    fn visible_overlays_in_range() {
        let mut session = Session::default();
        session.map_mut().set_view(MapView::default().with_zoom(12.0));
        let overlays = session
            .map_mut()
            .ensure_group(GroupType::Overlay, "Overlays");
        overlays.add_layer(wms("roads", 5), true);
        overlays.add_layer(wms("rivers", 1), true);
        overlays.add_layer(wms("hidden", 3), false);
        overlays.add_layer(wms("detail", 2).with_zoom_range(Some(15.0), None), true);
        overlays.add_layer(
            Layer::new("stops", "Stops", LayerSource::Vector(FeatureStore::default())),
            true,
        );

        let urls = legend_urls(&session, &LegendOptions::default());
        let ids: Vec<&str> = urls.legends.iter().map(|l| l.layer_id.as_str()).collect();
        assert_eq!(ids, vec!["rivers", "roads"]);
        assert!(urls.legends[0].url.contains("STYLE=bold"));
        assert!(urls.legends[0].url.contains("REQUEST=GetLegendGraphic"));
        assert_eq!(urls.non_legendable, vec!["Stops".to_string()]);
    }
}
