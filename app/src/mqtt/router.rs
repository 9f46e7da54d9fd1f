use crate::error::BrokerError;
use fastscale_core::RecordKind;
use rumqttc::QoS;

pub const TEST_DEVICE_TOPIC: &str = "/fastscaledb/testdevice";
pub const ENVIRO_GROW_TOPIC: &str = "/fastscaledb/enviro/grow";
pub const SENSOR_REGISTER_TOPIC: &str = "/fastscaledb/sensor/register";
pub const ENVIRO_REGISTER_TOPIC: &str = "/fastscaledb/enviro/register";
pub const TEST_PUBLISH_TOPIC: &str = "/mqtt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    /// Decode and store the payload
    Persist(RecordKind),
    /// Provision an enviro device through the registry
    Register,
    /// Only logged
    Log(&'static str),
}

#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: String,
    pub qos: QoS,
    pub handler: Handler,
}

/// Ordered table of topic filters, every matching route handles a message
#[derive(Debug, Clone, Default)]
pub struct TopicRouter {
    routes: Vec<Route>,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        mut self,
        pattern: &str,
        qos: QoS,
        handler: Handler,
    ) -> Result<Self, BrokerError> {
        if !valid_filter(pattern) {
            return Err(BrokerError::InvalidFilter(pattern.to_owned()));
        }
        self.routes.push(Route {
            pattern: pattern.to_owned(),
            qos,
            handler,
        });
        Ok(self)
    }

    pub fn routes_for<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a Route> + 'a {
        self.routes
            .iter()
            .filter(move |route| topic_matches(topic, &route.pattern))
    }

    /// Distinct filters, each with the highest QoS requested for it
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        let mut subs: Vec<(String, QoS)> = Vec::new();
        for route in &self.routes {
            match subs.iter_mut().find(|(pattern, _)| *pattern == route.pattern) {
                Some((_, qos)) if (route.qos as u8) > (*qos as u8) => *qos = route.qos,
                Some(_) => (),
                None => subs.push((route.pattern.clone(), route.qos)),
            }
        }
        subs
    }
}

pub fn default_routes() -> Result<TopicRouter, BrokerError> {
    TopicRouter::new()
        .route(
            TEST_DEVICE_TOPIC,
            QoS::AtMostOnce,
            Handler::Persist(RecordKind::TestDevice),
        )?
        .route(
            ENVIRO_GROW_TOPIC,
            QoS::AtLeastOnce,
            Handler::Persist(RecordKind::EnviroGrow),
        )?
        .route(
            SENSOR_REGISTER_TOPIC,
            QoS::AtLeastOnce,
            Handler::Persist(RecordKind::Sensor),
        )?
        .route(ENVIRO_REGISTER_TOPIC, QoS::AtLeastOnce, Handler::Register)?
        .route(
            "mqtt/+/temperature",
            QoS::AtLeastOnce,
            Handler::Log("temperature/humidity"),
        )?
        .route(
            "mqtt/+/humidity",
            QoS::AtLeastOnce,
            Handler::Log("temperature/humidity"),
        )?
        .route("my/mqtt/topic/#", QoS::ExactlyOnce, Handler::Log("high qos"))?
        .route(TEST_PUBLISH_TOPIC, QoS::AtMostOnce, Handler::Log("message"))
}

/// MQTT filter matching with `+` for one level and `#` for the remaining levels
pub fn topic_matches(topic: &str, filter: &str) -> bool {
    if topic == filter {
        return true;
    }
    // wildcards never match system topics
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut topic_levels = topic.split('/');
    for level in filter.split('/') {
        match (level, topic_levels.next()) {
            ("#", _) => return true,
            ("+", Some(_)) => (),
            (level, Some(actual)) if level == actual => (),
            _ => return false,
        }
    }
    topic_levels.next().is_none()
}

pub fn valid_filter(filter: &str) -> bool {
    if filter.is_empty() {
        return false;
    }
    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    levels.iter().enumerate().all(|(i, level)| match *level {
        "#" => i == last,
        "+" => true,
        level => !level.contains('+') && !level.contains('#'),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exact_and_single_level() {
        assert!(topic_matches("/mqtt", "/mqtt"));
        assert!(topic_matches("mqtt/kitchen/temperature", "mqtt/+/temperature"));
        assert!(!topic_matches("mqtt/kitchen/humidity", "mqtt/+/temperature"));
        assert!(!topic_matches("mqtt/a/b/temperature", "mqtt/+/temperature"));
        assert!(!topic_matches("mqtt/temperature", "mqtt/+/temperature"));
    }

    #[test]
    fn test_multi_level() {
        assert!(topic_matches("my/mqtt/topic/a/b", "my/mqtt/topic/#"));
        assert!(topic_matches("my/mqtt/topic", "my/mqtt/topic/#"));
        assert!(!topic_matches("my/mqtt/other", "my/mqtt/topic/#"));
        assert!(topic_matches("anything/at/all", "#"));
        assert!(!topic_matches("$SYS/broker", "#"));
    }

    #[test]
    fn test_leading_slash_is_a_level() {
        assert!(!topic_matches("/fastscaledb/testdevice", "fastscaledb/testdevice"));
        assert!(topic_matches("/fastscaledb/testdevice", "+/fastscaledb/testdevice"));
    }

    #[test]
    fn test_invalid_filters() {
        assert!(valid_filter("a/+/c"));
        assert!(valid_filter("a/#"));
        assert!(!valid_filter("a/#/c"));
        assert!(!valid_filter("a/b+"));
        assert!(!valid_filter("a#"));
        assert!(!valid_filter(""));

        let res = TopicRouter::new().route("a/#/c", QoS::AtMostOnce, Handler::Log("x"));
        assert!(matches!(res, Err(BrokerError::InvalidFilter(_))));
    }

    #[test]
    fn test_subscriptions_keep_highest_qos() {
        let router = TopicRouter::new()
            .route("a/b", QoS::AtMostOnce, Handler::Log("first"))
            .unwrap()
            .route("a/+", QoS::AtLeastOnce, Handler::Log("second"))
            .unwrap()
            .route("a/b", QoS::ExactlyOnce, Handler::Log("third"))
            .unwrap();

        let subs = router.subscriptions();

        assert_eq!(
            vec![
                ("a/b".to_owned(), QoS::ExactlyOnce),
                ("a/+".to_owned(), QoS::AtLeastOnce)
            ],
            subs
        );
        assert_eq!(3, router.routes_for("a/b").count());
    }

    #[test]
    fn test_default_routes() {
        let router = default_routes().unwrap();

        assert_eq!(8, router.subscriptions().len());
        let handlers: Vec<&Handler> = router
            .routes_for("mqtt/livingroom/humidity")
            .map(|r| &r.handler)
            .collect();
        assert_eq!(vec![&Handler::Log("temperature/humidity")], handlers);
        assert_eq!(0, router.routes_for("unrouted/topic").count());
    }
}
