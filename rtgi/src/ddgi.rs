//! Dynamic diffuse GI: grids of irradiance probes updated by ray tracing a
//! few of them per frame.

mod archive;
mod manager;
mod settings;
mod textures;
mod volume;

use std::cell::Ref;
use std::f32::consts::PI;

use glam::{uvec2, Vec3, Vec4};
use rtgi_gpu::{
    DdgiPassParams, DdgiRayData, DdgiTexturesView, DDGI_DISTANCE_TEXELS,
    DDGI_IRRADIANCE_TEXELS,
};
use rtgi_shaders::ddgi_scroll::ScrollTargets;
use rtgi_shaders::{
    ddgi_blend, ddgi_border, ddgi_classify, ddgi_relocate, ddgi_scroll,
    ddgi_trace,
};

pub use self::archive::*;
pub use self::manager::*;
pub use self::settings::*;
pub use self::textures::*;
pub use self::volume::*;
use crate::{dispatch_1d, dispatch_2d, GiFrame, GiStrategy, Handle, Resources};

/// DDGI strategy for a single frame: updates one volume of the scene, then
/// lights the view with the volumes surrounding it.
pub struct Ddgi<'m> {
    manager: &'m mut DdgiManager,
    scene: DdgiSceneId,
    update: Option<DdgiUpdate>,
    rays: Option<Handle<Vec<DdgiRayData>>>,
}

impl<'m> Ddgi<'m> {
    pub fn new(manager: &'m mut DdgiManager, scene: DdgiSceneId) -> Self {
        Self {
            manager,
            scene,
            update: None,
            rays: None,
        }
    }

    /// Volume being updated this frame, once candidates got generated.
    pub fn update(&self) -> Option<&DdgiUpdate> {
        self.update.as_ref()
    }

    fn params(frame: &GiFrame, update: &DdgiUpdate) -> DdgiPassParams {
        DdgiPassParams {
            seed: frame.seed,
            light_count: frame.lights.count,
            infinite_count: frame.lights.infinite_count,
            reset: update.reset as u32,
            irradiance_scalar: update.settings.irradiance_scalar,
            emissive_multiplier: update.settings.emissive_multiplier,
            lighting_multiplier: update.settings.lighting_multiplier,
            ray_bias: frame.config.ray_bias,
        }
    }
}

impl GiStrategy for Ddgi<'_> {
    /// Scrolls the picked volume and traces its probe rays.
    fn generate_candidates(&mut self, frame: &mut GiFrame) {
        self.update = self
            .manager
            .schedule(&frame.config.ddgi, self.scene, frame.seed);

        self.rays = None;

        let Some(update) = &self.update else {
            return;
        };

        let desc = update.desc;
        let textures = update.textures;
        let params = Self::params(frame, update);
        let tracer = frame.tracer;
        let lights = frame.lights;
        let sampler = frame.config.ddgi.light_sampler();

        if desc.is_scrolling_enabled() {
            let mut pass = frame
                .graph
                .add_pass("ddgi_scroll")
                .write(textures.spaces)
                .write(textures.irradiance)
                .write(textures.distance)
                .write(textures.states);

            if let Some(offsets) = textures.offsets {
                pass = pass.write(offsets);
            }

            pass.run(move |res| {
                let mut spaces = res.write(textures.spaces);
                let mut irradiance = res.write(textures.irradiance);
                let mut distance = res.write(textures.distance);
                let mut states = res.write(textures.states);
                let mut offsets = textures.offsets.map(|offsets| res.write(offsets));

                let mut irradiance = irradiance.view_mut();
                let mut distance = distance.view_mut();
                let mut states = states.view_mut();
                let mut offsets = offsets.as_mut().map(|offsets| offsets.view_mut());

                dispatch_1d(desc.probe_count(), |global_id| {
                    ddgi_scroll::main(
                        global_id,
                        &desc,
                        &mut spaces,
                        ScrollTargets {
                            irradiance: &mut irradiance,
                            distance: &mut distance,
                            offsets: offsets.as_mut(),
                            states: Some(&mut states),
                        },
                    );
                });
            });
        }

        let rays = frame.graph.create(vec![
            DdgiRayData::default();
            (desc.probe_count() * desc.rays_per_probe) as usize
        ]);

        let mut pass = frame
            .graph
            .add_pass("ddgi_trace")
            .read(textures.irradiance)
            .read(textures.distance)
            .read(textures.states);

        if let Some(offsets) = textures.offsets {
            pass = pass.read(offsets);
        }

        lights.read(pass).write(rays).run(move |res| {
            let irradiance = res.read(textures.irradiance);
            let distance = res.read(textures.distance);
            let states = res.read(textures.states);
            let offsets = textures.offsets.map(|offsets| res.read(offsets));
            let mut rays = res.write(rays);

            let views = DdgiTexturesView {
                irradiance: irradiance.view(),
                distance: distance.view(),
                offsets: offsets.as_ref().map(|offsets| offsets.view()),
                states: Some(states.view()),
            };

            lights.with(res, sampler, |sampler| {
                dispatch_2d(uvec2(desc.rays_per_probe, desc.probe_index_count), |global_id| {
                    ddgi_trace::main(
                        global_id, &desc, &params, sampler, &tracer, &views, &mut rays,
                    );
                });
            });
        });

        self.rays = Some(rays);
    }

    /// Blends the traced rays into the probes, then fixes up their borders,
    /// positions and states.
    fn reuse(&mut self, frame: &mut GiFrame) {
        let (Some(update), Some(rays)) = (&self.update, self.rays) else {
            return;
        };

        let desc = update.desc;
        let textures = update.textures;
        let params = Self::params(frame, update);

        let atlases = [
            ("irradiance", textures.irradiance, DDGI_IRRADIANCE_TEXELS),
            ("distance", textures.distance, DDGI_DISTANCE_TEXELS),
        ];

        for (name, atlas, num_texels) in atlases {
            frame
                .graph
                .add_pass(format!("ddgi_blend({name})"))
                .read(rays)
                .read(textures.states)
                .write(atlas)
                .run(move |res| {
                    let rays = res.read(rays);
                    let states = res.read(textures.states);
                    let mut atlas = res.write(atlas);
                    let states = states.view();
                    let mut atlas = atlas.view_mut();

                    dispatch_2d(desc.atlas_size(num_texels), |global_id| {
                        if num_texels == DDGI_IRRADIANCE_TEXELS {
                            ddgi_blend::irradiance(global_id, &desc, &rays, Some(&states), &mut atlas);
                        } else {
                            ddgi_blend::distance(global_id, &desc, &rays, Some(&states), &mut atlas);
                        }
                    });
                });
        }

        for (name, atlas, num_texels) in atlases {
            // columns copy the corners, so they go last
            frame
                .graph
                .add_pass(format!("ddgi_border_rows({name})"))
                .write(atlas)
                .run(move |res| {
                    let mut atlas = res.write(atlas);
                    let mut atlas = atlas.view_mut();

                    dispatch_1d(desc.probe_count(), |global_id| {
                        ddgi_border::rows(global_id, &desc, num_texels, &mut atlas);
                    });
                });

            frame
                .graph
                .add_pass(format!("ddgi_border_columns({name})"))
                .write(atlas)
                .run(move |res| {
                    let mut atlas = res.write(atlas);
                    let mut atlas = atlas.view_mut();

                    dispatch_1d(desc.probe_count(), |global_id| {
                        ddgi_border::columns(global_id, &desc, num_texels, &mut atlas);
                    });
                });
        }

        if let Some(offsets) = textures.offsets {
            frame
                .graph
                .add_pass("ddgi_relocate")
                .read(rays)
                .write(offsets)
                .run(move |res| {
                    let rays = res.read(rays);
                    let mut offsets = res.write(offsets);
                    let mut offsets = offsets.view_mut();

                    dispatch_1d(desc.probe_count(), |global_id| {
                        ddgi_relocate::main(global_id, &desc, &params, &rays, &mut offsets);
                    });
                });
        }

        if desc.is_classification_enabled() {
            frame
                .graph
                .add_pass("ddgi_classify")
                .read(rays)
                .write(textures.states)
                .run(move |res| {
                    let rays = res.read(rays);
                    let mut states = res.write(textures.states);
                    let mut states = states.view_mut();

                    dispatch_1d(desc.probe_count(), |global_id| {
                        ddgi_classify::main(global_id, &desc, &params, &rays, &mut states);
                    });
                });
        }
    }

    /// Lights every pixel with the volumes around it, blended in the order
    /// of their importance.
    fn evaluate(&mut self, frame: &mut GiFrame) {
        let volumes = self.manager.shading_volumes(self.scene, frame.view);
        let gbuffer = frame.gbuffer;
        let output = frame.output;
        let camera = frame.view.position;
        let demodulate = frame.config.ddgi.demodulate_materials;

        let mut pass = frame.graph.add_pass("ddgi_evaluate").read(gbuffer);

        for volume in &volumes {
            pass = pass
                .read(volume.textures.irradiance)
                .read(volume.textures.distance)
                .read(volume.textures.states);

            if let Some(offsets) = volume.textures.offsets {
                pass = pass.read(offsets);
            }
        }

        pass.write(output).run(move |res| {
            let gbuffer = res.read(gbuffer);
            let mut output = res.write(output);

            let textures: Vec<_> = volumes
                .iter()
                .map(|volume| VolumeTextures::read(res, volume))
                .collect();

            let volumes: Vec<_> = volumes
                .iter()
                .zip(&textures)
                .map(|(volume, textures)| (volume, textures.view()))
                .collect();

            for (out, surface) in output.iter_mut().zip(gbuffer.iter()) {
                if surface.is_none() {
                    *out = Vec4::ZERO;
                    continue;
                }

                let view_dir = (surface.position - camera).normalize_or_zero();
                let mut irradiance = Vec3::ZERO;
                let mut weights = 0.0;

                for (volume, volume_textures) in &volumes {
                    let weight = volume.desc.volume_weight(surface.position).min(1.0 - weights);

                    if weight <= 0.0 {
                        continue;
                    }

                    irradiance += volume.desc.sample_irradiance(
                        volume_textures,
                        surface.position,
                        surface.normal,
                        view_dir,
                    ) * volume.irradiance_scalar
                        * weight;

                    weights += weight;

                    if weights >= 1.0 {
                        break;
                    }
                }

                let diffuse = if demodulate {
                    irradiance / PI
                } else {
                    surface.albedo * irradiance / PI
                };

                *out = diffuse.extend(0.0);
            }
        });
    }
}

/// Borrowed textures of a shading volume.
struct VolumeTextures<'a> {
    irradiance: Ref<'a, ProbeTexture>,
    distance: Ref<'a, ProbeTexture>,
    offsets: Option<Ref<'a, ProbeTexture>>,
    states: Ref<'a, ProbeTexture>,
}

impl<'a> VolumeTextures<'a> {
    fn read(res: &'a Resources<'_>, volume: &DdgiShadingVolume) -> Self {
        Self {
            irradiance: res.read(volume.textures.irradiance),
            distance: res.read(volume.textures.distance),
            offsets: volume.textures.offsets.map(|offsets| res.read(offsets)),
            states: res.read(volume.textures.states),
        }
    }

    fn view(&self) -> DdgiTexturesView<'_> {
        DdgiTexturesView {
            irradiance: self.irradiance.view(),
            distance: self.distance.view(),
            offsets: self.offsets.as_ref().map(|offsets| offsets.view()),
            states: Some(self.states.view()),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{ivec3, vec3};

    use super::*;
    use crate::{GiBackend, GiConfig, GiRenderer, GiView, Light, LightHandle, Scene};

    /// Closed box lit by a single point light, with a probe volume slightly
    /// larger than the box (so that its walls lie within the blended region).
    fn setup(config: GiConfig) -> (GiRenderer, Scene, GiView, DdgiVolumeId) {
        let mut scene = Scene::default();

        scene.add_plane(vec3(0.0, -100.0, 0.0), Vec3::Y, Vec3::splat(0.8));
        scene.add_plane(vec3(0.0, 100.0, 0.0), -Vec3::Y, Vec3::splat(0.8));
        scene.add_plane(vec3(-100.0, 0.0, 0.0), Vec3::X, Vec3::splat(0.8));
        scene.add_plane(vec3(100.0, 0.0, 0.0), -Vec3::X, Vec3::splat(0.8));
        scene.add_plane(vec3(0.0, 0.0, -100.0), Vec3::Z, Vec3::splat(0.8));
        scene.add_plane(vec3(0.0, 0.0, 100.0), -Vec3::Z, Vec3::splat(0.8));

        let mut renderer = GiRenderer::new(config);

        renderer.lights_mut().add(
            LightHandle(0),
            Light::point(vec3(0.0, 50.0, 0.0), Vec3::splat(5000.0), 500.0),
        );

        let volume = renderer.ddgi_mut().add_volume(
            DdgiSceneId::default(),
            DdgiVolumeSettings {
                probe_counts: ivec3(4, 4, 4),
                rays_per_probe: 144,
                view_bias: 1.0,
                normal_bias: 1.0,
                blending_distance: 0.0,
                ..Default::default()
            },
            DdgiTransform {
                scale: Vec3::splat(1.5),
                ..Default::default()
            },
        );

        let mut view = GiView::new(uvec2(8, 8), Vec3::ZERO, -Vec3::Y);

        view.up = Vec3::Z;

        (renderer, scene, view, volume)
    }

    fn config() -> GiConfig {
        GiConfig {
            backend: GiBackend::Ddgi,
            seed: Some(5),
            ..Default::default()
        }
    }

    #[test]
    fn probe_update_passes_run_in_order() {
        let _ = env_logger::builder().is_test(true).try_init();

        let (mut renderer, scene, view, _) = setup(config());
        let frame = renderer.render(&view, &scene);

        let expected = [
            "ddgi_trace",
            "ddgi_blend(irradiance)",
            "ddgi_blend(distance)",
            "ddgi_border_rows(irradiance)",
            "ddgi_border_columns(irradiance)",
            "ddgi_border_rows(distance)",
            "ddgi_border_columns(distance)",
            "ddgi_relocate",
            "ddgi_classify",
            "ddgi_evaluate",
        ];

        let executed: Vec<_> = frame
            .passes
            .iter()
            .map(String::as_str)
            .filter(|pass| pass.starts_with("ddgi_"))
            .collect();

        assert_eq!(expected.as_slice(), executed.as_slice());
    }

    #[test]
    fn probes_converge_towards_lit_surfaces() {
        let (mut renderer, scene, view, _) = setup(config());

        let mut frame = None;

        for _ in 0..8 {
            frame = Some(renderer.render(&view, &scene));
        }

        let diffuse = frame.unwrap().diffuse;

        assert!(diffuse
            .iter()
            .all(|pixel| pixel.x > 0.0 && pixel.x.is_finite()));
    }

    #[test]
    fn disabled_volumes_leave_the_view_dark() {
        let (mut renderer, scene, view, volume) = setup(config());

        renderer.ddgi_mut().volume_mut(volume).unwrap().set_enabled(false);

        let frame = renderer.render(&view, &scene);

        assert!(!frame.passes.iter().any(|pass| pass == "ddgi_trace"));
        assert!(frame.diffuse.iter().all(|pixel| *pixel == Vec4::ZERO));
    }

    #[test]
    fn scrolling_volumes_scroll_first() {
        let (mut renderer, scene, view, volume) = setup(config());
        let mut settings = renderer.ddgi().volume(volume).unwrap().settings().clone();

        settings.scroll_probes_infinitely = true;
        renderer.ddgi_mut().volume_mut(volume).unwrap().set_settings(settings);

        let frame = renderer.render(&view, &scene);

        let first = frame
            .passes
            .iter()
            .find(|pass| pass.starts_with("ddgi_"))
            .map(String::as_str);

        assert_eq!(Some("ddgi_scroll"), first);
    }
}
